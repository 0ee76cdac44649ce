use crate::atproto::types::ProfileView;
use crate::error::ApiResult;
use crate::ids::IdMapper;
use crate::mastodon::Account;
use crate::richtext;

/// Translate an actor profile into a Mastodon account.
///
/// Every profile passing through also feeds the handle index, so later
/// handle lookups resolve without an upstream round trip.
pub async fn account_from_profile(ids: &IdMapper, profile: &ProfileView) -> ApiResult<Account> {
    let id = ids.snowflake_for_did(&profile.did).await?;
    ids.record_handle(&profile.handle, &profile.did).await;

    let username = profile
        .handle
        .split('.')
        .next()
        .unwrap_or(&profile.handle)
        .to_string();

    let display_name = match &profile.display_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => profile.handle.clone(),
    };

    let note = profile
        .description
        .as_deref()
        .map(|bio| richtext::render(bio, &[]))
        .unwrap_or_default();

    let avatar = profile
        .avatar
        .clone()
        .unwrap_or_else(|| gravatar_url(&profile.handle));
    let header = profile.banner.clone().unwrap_or_default();

    Ok(Account {
        id: id.to_string(),
        username,
        acct: profile.handle.clone(),
        display_name,
        note,
        url: richtext::profile_url(&profile.handle),
        avatar_static: avatar.clone(),
        avatar,
        header_static: header.clone(),
        header,
        locked: false,
        bot: false,
        created_at: super::timestamp_or_epoch(profile.created_at.as_deref()),
        followers_count: profile.followers_count.unwrap_or(0),
        following_count: profile.follows_count.unwrap_or(0),
        statuses_count: profile.posts_count.unwrap_or(0),
        fields: None,
        emojis: None,
    })
}

/// Deterministic fallback avatar: Gravatar identicon keyed by the handle.
fn gravatar_url(handle: &str) -> String {
    let digest = md5::compute(format!("{handle}@gravatar.com"));
    format!("https://www.gravatar.com/avatar/{digest:x}?d=identicon")
}
