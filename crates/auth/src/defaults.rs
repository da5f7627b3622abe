use {canispect_config::CanispectConfig, url::Url};

/// Identity provider endpoint for the configured mode.
///
/// Development uses the provider canister on the local replica
/// (`<local_host>/?canisterId=<id>`); production uses the public provider.
pub fn provider_url(config: &CanispectConfig) -> Result<Url, url::ParseError> {
    if config.mode.is_development() {
        let mut url = Url::parse(&config.network.local_host)?;
        url.set_path("/");
        url.query_pairs_mut()
            .clear()
            .append_pair("canisterId", config.identity.local_canister_id.as_str());
        Ok(url)
    } else {
        Url::parse(&config.identity.public_url)
    }
}
