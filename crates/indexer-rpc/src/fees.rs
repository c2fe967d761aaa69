use chain_btc::fee::{FeeList, FeeTier};
use chain_btc::network::Environment;
use tracing::debug;

use crate::error::IndexerError;

/// Fetch the fee tier list from the environment's fee estimates endpoint.
pub async fn fetch_fee_tiers(
    client: &reqwest::Client,
    environment: &Environment,
) -> Result<Vec<FeeTier>, IndexerError> {
    let response = client
        .get(&environment.fee_estimates_url)
        .send()
        .await
        .map_err(|e| IndexerError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(IndexerError::Http { status, body });
    }

    let body = response
        .text()
        .await
        .map_err(|e| IndexerError::Transport(e.to_string()))?;
    let tiers = parse_fee_list(&body)?;
    debug!(tiers = tiers.len(), "fee tiers fetched");
    Ok(tiers)
}

fn parse_fee_list(body: &str) -> Result<Vec<FeeTier>, IndexerError> {
    let list: FeeList = serde_json::from_str(body)
        .map_err(|e| IndexerError::Transport(format!("malformed fee list: {e}")))?;
    Ok(list.tiers())
}
