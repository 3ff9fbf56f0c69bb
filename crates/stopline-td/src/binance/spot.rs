//! Binance Spot REST client.
//!
//! # REST endpoints
//!
//! | Operation        | Method | Path                    | Security |
//! |------------------|--------|-------------------------|----------|
//! | Exchange info    | GET    | `/api/v3/exchangeInfo`  | none     |
//! | Ticker prices    | GET    | `/api/v3/ticker/price`  | none     |
//! | Account info     | GET    | `/api/v3/account`       | SIGNED   |
//! | New order        | POST   | `/api/v3/order`         | SIGNED   |
//! | New OCO          | POST   | `/api/v3/order/oco`     | SIGNED   |
//! | Cancel order     | DELETE | `/api/v3/order`         | SIGNED   |
//! | Cancel OCO       | DELETE | `/api/v3/orderList`     | SIGNED   |
//!
//! Error payloads (`{"code": -2010, "msg": "..."}`) are decoded into
//! [`ExchangeError::Api`] together with the HTTP status, so rate-limit (429)
//! and ban (418) answers classify correctly even without a body.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use stopline_core::time_util::now_ms;
use stopline_core::{
    Balance, ClientOrderId, Money, OcoOrderRequest, OcoOrderResult, OrderId, OrderRequest, OrderResult, OrderStatus,
};
use tracing::{debug, warn};

use super::auth::RequestSigner;
use super::config::BinanceConfig;
use crate::error::ExchangeError;
use crate::rules::ExchangeInfo;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// `newOrderRespType=RESULT` answer of `POST /api/v3/order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    symbol: String,
    order_id: u64,
    client_order_id: String,
    transact_time: u64,
    executed_qty: Money,
    cummulative_quote_qty: Money,
    status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcoLeg {
    order_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOcoResponse {
    symbol: String,
    order_list_id: i64,
    list_client_order_id: String,
    transaction_time: u64,
    orders: Vec<OcoLeg>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: Money,
}

// ---------------------------------------------------------------------------
// SpotClient
// ---------------------------------------------------------------------------

/// Binance Spot REST client. Stateless apart from its HTTP connection pool.
#[derive(Debug)]
pub struct SpotClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// API key (sent in `X-MBX-APIKEY` header).
    api_key: String,
    signer: RequestSigner,
    /// REST base URL (e.g. `https://api.binance.com`).
    base_url: String,
    /// `recvWindow` for signed requests.
    recv_window: u64,
}

impl SpotClient {
    pub fn new(config: &BinanceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            signer: RequestSigner::from_config(config)?,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            recv_window: config.recv_window,
        })
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    /// Fetch exchange info (symbol list, filters).
    pub async fn get_exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        self.public_get("/api/v3/exchangeInfo").await
    }

    /// Last price of every symbol.
    pub async fn get_ticker_prices(&self) -> Result<HashMap<String, Money>, ExchangeError> {
        let tickers: Vec<TickerPrice> = self.public_get("/api/v3/ticker/price").await?;
        Ok(tickers.into_iter().map(|t| (t.symbol, t.price)).collect())
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    /// Non-zero balances of the spot account.
    pub async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let account: AccountResponse = self.signed(Method::GET, "/api/v3/account", Vec::new()).await?;
        Ok(account.balances.into_iter().filter(|b| !(b.free.is_zero() && b.locked.is_zero())).collect())
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub async fn new_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
            ("quantity", order.quantity.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if let Some(price) = order.price {
            params.push(("price", price.to_string()));
        }
        if let Some(stop_price) = order.stop_price {
            params.push(("stopPrice", stop_price.to_string()));
        }
        if let Some(tif) = order.time_in_force {
            params.push(("timeInForce", tif.as_str().to_string()));
        }
        if let Some(ref cid) = order.client_order_id {
            params.push(("newClientOrderId", cid.to_string()));
        }

        let resp: NewOrderResponse = self.signed(Method::POST, "/api/v3/order", params).await?;
        debug!("[spot] order {} {} {:?} executed {}", resp.symbol, resp.order_id, resp.status, resp.executed_qty);
        Ok(OrderResult {
            symbol: resp.symbol,
            order_id: OrderId::new(resp.order_id.to_string()),
            client_order_id: Some(ClientOrderId::new(resp.client_order_id)),
            status: resp.status,
            executed_qty: resp.executed_qty,
            cummulative_quote_qty: resp.cummulative_quote_qty,
            transact_time_ms: resp.transact_time,
        })
    }

    pub async fn new_oco_order(&self, order: &OcoOrderRequest) -> Result<OcoOrderResult, ExchangeError> {
        let params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("quantity", order.quantity.to_string()),
            ("price", order.price.to_string()),
            ("stopPrice", order.stop_price.to_string()),
            ("stopLimitPrice", order.stop_limit_price.to_string()),
            ("stopLimitTimeInForce", order.stop_limit_time_in_force.as_str().to_string()),
            ("listClientOrderId", order.list_client_order_id.to_string()),
            ("limitClientOrderId", order.limit_client_order_id.to_string()),
            ("stopClientOrderId", order.stop_client_order_id.to_string()),
        ];

        let resp: NewOcoResponse = self.signed(Method::POST, "/api/v3/order/oco", params).await?;
        debug!("[spot] oco {} list {} with {} legs", resp.symbol, resp.order_list_id, resp.orders.len());
        Ok(OcoOrderResult {
            symbol: resp.symbol,
            order_list_id: OrderId::new(resp.order_list_id.to_string()),
            list_client_order_id: ClientOrderId::new(resp.list_client_order_id),
            order_ids: resp.orders.into_iter().map(|o| OrderId::new(o.order_id.to_string())).collect(),
            transact_time_ms: resp.transaction_time,
        })
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> Result<(), ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let _: serde_json::Value = self.signed(Method::DELETE, "/api/v3/order", params).await?;
        Ok(())
    }

    pub async fn cancel_order_list(&self, symbol: &str, order_list_id: &OrderId) -> Result<(), ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderListId", order_list_id.to_string())];
        let _: serde_json::Value = self.signed(Method::DELETE, "/api/v3/orderList", params).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn public_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExchangeError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        read_response(resp).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ExchangeError> {
        params.push(("recvWindow", self.recv_window.to_string()));
        params.push(("timestamp", now_ms().to_string()));
        let query = self.signer.signed_query(&params)?;

        debug!("[spot] {method} {path}");
        let url = format!("{}{path}?{query}", self.base_url);
        let resp = self.http.request(method, &url).header("X-MBX-APIKEY", &self.api_key).send().await?;
        read_response(resp).await
    }
}

/// Decode a success body as `T`, or an error body as [`ExchangeError::Api`].
async fn read_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ExchangeError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }
    let error = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody { code, msg }) => ExchangeError::api(code, msg, status.as_u16()),
        Err(_) => ExchangeError::api(0, body, status.as_u16()),
    };
    warn!("[spot] request failed: {error}");
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_new_order_result() {
        let raw = r#"{
            "symbol": "BTCUSDT", "orderId": 28, "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP", "transactTime": 1507725176595,
            "price": "0.10000000", "origQty": "10.00000000", "executedQty": "10.00000000",
            "origQuoteOrderQty": "0.000000", "cummulativeQuoteQty": "10.00000000",
            "status": "FILLED", "timeInForce": "GTC", "type": "MARKET", "side": "SELL"
        }"#;
        let resp: NewOrderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.order_id, 28);
        assert_eq!(resp.status, OrderStatus::Filled);
        assert_eq!(resp.executed_qty, Money::from(10));
    }

    #[test]
    fn decodes_oco_result() {
        let raw = r#"{
            "orderListId": 0, "contingencyType": "OCO", "listStatusType": "EXEC_STARTED",
            "listOrderStatus": "EXECUTING", "listClientOrderId": "JYVpp3F0f5CAG15DhtrqLp",
            "transactionTime": 1563417480525, "symbol": "LTCBTC",
            "orders": [
                {"symbol": "LTCBTC", "orderId": 2, "clientOrderId": "Kk7sqHb9J6mJWTMDVW7Vos"},
                {"symbol": "LTCBTC", "orderId": 3, "clientOrderId": "xTXKaGYd4bluPVp78IVRvl"}
            ]
        }"#;
        let resp: NewOcoResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.order_list_id, 0);
        assert_eq!(resp.orders.len(), 2);
    }

    #[test]
    fn decodes_account_balances() {
        let raw = r#"{"makerCommission": 15, "balances": [
            {"asset": "BTC", "free": "4723846.89208129", "locked": "0.00000000"},
            {"asset": "LTC", "free": "0.00000000", "locked": "0.00000000"}
        ]}"#;
        let account: AccountResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(account.balances.len(), 2);
        assert!(account.balances[1].total().unwrap().is_zero());
    }
}
