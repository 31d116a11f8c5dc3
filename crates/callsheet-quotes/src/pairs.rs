use async_trait::async_trait;

use crate::error::QuoteError;

/// USD-denominated pair used for the single cross-rate conversion.
const BTC_USD_PAIR: &str = "BTCUSDT";
const BRIDGE_ASSET: &str = "BTC";

/// An exchange that prices concatenated trading pairs such as `ETHUSDT`.
#[async_trait]
pub(crate) trait PairMarket: Send + Sync {
    async fn pair_price(&self, pair: &str) -> Result<Option<f64>, QuoteError>;
}

/// Try each direct quote currency in order, then one `SYM/BTC × BTC/USDT`
/// conversion.
pub(crate) async fn resolve<M>(
    market: &M,
    symbol: &str,
    quote_currencies: &[&str],
) -> Result<Option<f64>, QuoteError>
where
    M: PairMarket + ?Sized,
{
    for quote in quote_currencies {
        if symbol == *quote {
            continue;
        }
        if let Some(price) = market.pair_price(&format!("{symbol}{quote}")).await? {
            return Ok(Some(price));
        }
    }

    if symbol == BRIDGE_ASSET {
        return Ok(None);
    }

    let Some(in_btc) = market.pair_price(&format!("{symbol}{BRIDGE_ASSET}")).await? else {
        return Ok(None);
    };
    let Some(btc_usd) = market.pair_price(BTC_USD_PAIR).await? else {
        return Ok(None);
    };
    Ok(Some(in_btc * btc_usd))
}
