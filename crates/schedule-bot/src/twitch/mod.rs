//! Twitch Helix schedule source.

mod auth;
mod schedule;

pub use auth::{
    AccessTokenProvider, ClientCredentialsExchange, TokenCache, TokenExchange, TokenGrant,
    REFRESH_MARGIN_SECS,
};
pub use schedule::{normalize_segments, ScheduleResponse, ScheduleSource, TwitchScheduleClient};

use crate::config::TwitchSettings;

/// Schedule client wired to a cached client-credentials token.
pub fn schedule_client(
    http: reqwest::Client,
    settings: &TwitchSettings,
) -> TwitchScheduleClient<TokenCache<ClientCredentialsExchange>> {
    let exchange = ClientCredentialsExchange::new(
        http.clone(),
        &settings.token_url,
        &settings.client_id,
        &settings.client_secret,
    );

    TwitchScheduleClient::new(
        http,
        &settings.helix_base_url,
        &settings.client_id,
        TokenCache::new(exchange),
    )
}
