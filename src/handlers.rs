//! HTTP endpoints of the payment gateway.
//!
//! `POST /process` is the priced resource. It sits behind [`paygate`], which answers
//! `402 Payment Required` with the payment terms until the request carries an `X-PAYMENT`
//! header that settles. Everything else is free: service status, the terms themselves, the
//! network table and shareable payment links.

use alloy_primitives::{Address, U256};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::instrument;

use crate::networks::USDC_DECIMALS;
use crate::payment_link::PaymentLink;
use crate::proto::header;
use crate::proto::v1::{PaymentRequirements, TokenAmount};
use crate::proto::{PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};
use crate::requirements::RequirementsBuilder;
use crate::settlement::{SettlementEngine, SettlementError, SettlementMode, SettlementResult, format_usdc};
use crate::util::{Base64Bytes, MoneyAmount};

/// Path of the priced resource.
pub const PROCESS_RESOURCE: &str = "/process";

/// Native balance (in wei-like units, 18 decimals) above which the settler can pay for gas: 0.001.
const MIN_GAS_BALANCE: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

/// Shared state of all handlers.
#[derive(Debug)]
pub struct AppState {
    pub engine: SettlementEngine,
    pub requirements: RequirementsBuilder,
    /// Recipient of payments for [`PROCESS_RESOURCE`].
    pub pay_to: Address,
    /// Price of one [`PROCESS_RESOURCE`] request, smallest USDC unit.
    pub price: TokenAmount,
    /// Network payments for [`PROCESS_RESOURCE`] are requested on.
    pub network: String,
    pub service_name: String,
}

impl AppState {
    fn process_requirements(&self) -> PaymentRequirements {
        self.requirements.build(
            PROCESS_RESOURCE,
            &format!("{} - Blockchain Intelligence", self.service_name),
            self.price,
            self.pay_to,
            &self.network,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

pub fn routes(state: Arc<AppState>) -> Router {
    let priced = Router::new()
        .route(PROCESS_RESOURCE, post(post_process))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), paygate));
    Router::new()
        .route("/health", get(get_health))
        .route("/merchant-status", get(get_merchant_status))
        .route("/payment-info", get(get_payment_info))
        .route("/api/networks", get(get_networks))
        .route("/api/payment-link/create", post(post_payment_link_create))
        .route("/api/payment-link/execute", post(post_payment_link_execute))
        .route("/api/payment-link/{link_id}", get(get_payment_link))
        .merge(priced)
        .with_state(state)
}

fn payment_failed(error: &SettlementError) -> Response {
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(json!({
            "status": "payment_failed",
            "error": error.to_string(),
            "errorKind": error.kind(),
        })),
    )
        .into_response()
}

fn settlement_to_header(settlement: &SettlementResult) -> Result<HeaderValue, String> {
    let json = serde_json::to_vec(settlement).map_err(|e| e.to_string())?;
    HeaderValue::from_bytes(Base64Bytes::encode(json).as_ref()).map_err(|e| e.to_string())
}

/// Gate for priced routes.
///
/// Without an `X-PAYMENT` header, answers 402 with the payment terms. With one, settles it
/// and answers 402 on failure. On success the inner handler runs with the
/// [`SettlementResult`] as a request extension, and the response gets an
/// `X-PAYMENT-RESPONSE` header.
#[instrument(name = "x402.paygate", skip_all)]
pub async fn paygate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(header_value) = request.headers().get(PAYMENT_HEADER) else {
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "status": "payment_required",
                "message": "Payment required to access this endpoint",
                "paymentInfo": state.process_requirements(),
            })),
        )
            .into_response();
    };
    let payment = match header_value.to_str() {
        Ok(value) => header::decode(value)
            .map_err(|e| SettlementError::MalformedPayload(e.to_string())),
        Err(_) => Err(SettlementError::MalformedPayload(
            "Payment header is not valid ASCII".to_string(),
        )),
    };
    let payment = match payment {
        Ok(payment) => payment,
        Err(error) => {
            tracing::warn!(%error, "Undecodable payment header");
            return payment_failed(&error);
        }
    };

    let settlement = state
        .engine
        .verify_and_settle(&payment, state.price, state.pay_to)
        .await;
    if let Some(error) = settlement.error() {
        return payment_failed(error);
    }
    let payment_response = match settlement_to_header(&settlement) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(%error, "Failed to encode settlement header");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, error);
        }
    };

    request.extensions_mut().insert(settlement);
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(PAYMENT_RESPONSE_HEADER, payment_response);
    response
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tools: Option<bool>,
}

/// `POST /process`: the paid request. Only reached once the payment has settled.
#[instrument(skip_all)]
pub async fn post_process(
    Extension(settlement): Extension<SettlementResult>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Message is required");
    };
    let Some(message) = body.message.filter(|m| !m.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Message is required");
    };
    Json(json!({
        "status": "completed",
        "response": {
            "message": message,
            "tools": body.tools.unwrap_or(true),
        },
        "payment": {
            "settled": true,
            "transaction": settlement.transaction(),
        },
    }))
    .into_response()
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let networks = state.engine.networks();
    let network = networks.by_key(&state.network);
    let price = MoneyAmount::from_token_amount(state.price, USDC_DECIMALS).to_fixed(2);
    Json(json!({
        "status": "healthy",
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "payment": {
            "network": state.network,
            "networkName": network.map(|n| n.name).unwrap_or(state.network.as_str()),
            "chainId": network.map(|n| n.chain_id),
            "price": format!("${price}"),
            "priceRaw": state.price,
            "asset": "USDC",
            "productionMode": state.engine.mode().is_live(),
        },
        "networks": networks.keys(),
        "networkCount": networks.len(),
    }))
}

/// `GET /merchant-status`: whether the settling account can pay for gas.
#[instrument(skip_all)]
pub async fn get_merchant_status(State(state): State<Arc<AppState>>) -> Response {
    let registry = match state.engine.mode() {
        SettlementMode::Simulated => {
            return Json(json!({
                "mode": "demo",
                "message": "Running in demo mode - MERCHANT_PRIVATE_KEY not configured",
                "productionReady": false,
            }))
            .into_response();
        }
        SettlementMode::Live(registry) => registry,
    };
    let merchant_error = |error: String| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "mode": "error", "error": error })),
        )
            .into_response()
    };
    let (Some(network), Some(ledger)) = (
        state.engine.networks().by_key(&state.network),
        registry.ledger(&state.network),
    ) else {
        return merchant_error(format!("Unsupported network: {}", state.network));
    };

    let address = ledger.settler();
    let balances = tokio::try_join!(ledger.native_balance(address), ledger.balance_of(address));
    let (native_balance, usdc_balance) = match balances {
        Ok(balances) => balances,
        Err(error) => {
            tracing::warn!(%error, "Failed to fetch merchant balances");
            return merchant_error(error.to_string());
        }
    };
    let has_gas = native_balance > MIN_GAS_BALANCE;
    let native = MoneyAmount::from_token_amount(
        TokenAmount(native_balance),
        u32::from(network.native_currency.decimals),
    );
    Json(json!({
        "mode": "production",
        "address": address,
        "network": network.key,
        "nativeBalance": native.to_string(),
        "nativeSymbol": network.native_currency.symbol,
        "usdcBalance": format_usdc(usdc_balance),
        "hasGas": has_gas,
        "productionReady": has_gas,
        "warning": (!has_gas).then(|| format!("Merchant wallet needs {} for gas fees", network.native_currency.symbol)),
    }))
    .into_response()
}

/// `GET /payment-info`: the terms of [`PROCESS_RESOURCE`].
#[instrument(skip_all)]
pub async fn get_payment_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.process_requirements())
}

/// `GET /api/networks`
#[instrument(skip_all)]
pub async fn get_networks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.networks().clone())
}

/// A whole-USDC amount, sent either as a JSON string or a JSON number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn as_text(&self) -> String {
        match self {
            AmountInput::Text(text) => text.clone(),
            AmountInput::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentLinkRequest {
    pub amount: Option<AmountInput>,
    pub recipient: Option<String>,
    pub description: Option<String>,
    pub network: Option<String>,
}

/// `POST /api/payment-link/create`
#[instrument(skip_all)]
pub async fn post_payment_link_create(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreatePaymentLinkRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Amount and recipient are required");
    };
    let (Some(amount), Some(recipient)) = (body.amount, body.recipient) else {
        return error_response(StatusCode::BAD_REQUEST, "Amount and recipient are required");
    };
    let amount = amount.as_text();
    let network = body.network.unwrap_or_else(|| "base".to_string());
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let link = match PaymentLink::create(
        &recipient,
        &amount,
        &network,
        body.description.as_deref(),
        state.engine.networks(),
        created_at,
    ) {
        Ok(link) => link,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error.to_string()),
    };
    let link_id = match link.encode() {
        Ok(link_id) => link_id,
        Err(error) => {
            tracing::error!(%error, "Failed to encode payment link");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create payment link",
            );
        }
    };
    tracing::info!(recipient = %link.recipient, amount = %link.amount, network = %link.network, "Payment link created");
    Json(json!({
        "success": true,
        "linkId": link_id,
        "link": format!("/pay/{link_id}"),
        "data": {
            "recipient": link.recipient,
            "amount": amount,
            "amountRaw": link.amount,
            "network": link.network,
            "description": link.description,
        },
    }))
    .into_response()
}

/// `GET /api/payment-link/{link_id}`
#[instrument(skip_all)]
pub async fn get_payment_link(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
) -> Response {
    let link = match PaymentLink::decode(&link_id) {
        Ok(link) => link,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error.to_string()),
    };
    let network = state.engine.networks().by_key(&link.network);
    Json(json!({
        "success": true,
        "recipient": link.recipient,
        "amount": link.display_amount(),
        "amountRaw": link.amount,
        "network": link.network,
        "networkName": network.map(|n| n.name).unwrap_or(link.network.as_str()),
        "description": link.description,
        "asset": network.map(|n| n.usdc_address),
        "createdAt": link.created_at,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePaymentLinkRequest {
    pub link_id: Option<String>,
    pub payment_header: Option<String>,
}

fn link_payment_failed(error: &SettlementError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": error.to_string(),
            "errorKind": error.kind(),
        })),
    )
        .into_response()
}

/// `POST /api/payment-link/execute`: settle a payment against a link's amount and recipient.
#[instrument(skip_all)]
pub async fn post_payment_link_execute(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecutePaymentLinkRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Link ID and payment header required");
    };
    let (Some(link_id), Some(payment_header)) = (body.link_id, body.payment_header) else {
        return error_response(StatusCode::BAD_REQUEST, "Link ID and payment header required");
    };
    let link = match PaymentLink::decode(&link_id) {
        Ok(link) => link,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error.to_string()),
    };
    let payment = match header::decode(&payment_header) {
        Ok(payment) => payment,
        Err(error) => {
            return link_payment_failed(&SettlementError::MalformedPayload(error.to_string()));
        }
    };
    if payment.network != link.network {
        return link_payment_failed(&SettlementError::TermsViolation(format!(
            "Payment network {} does not match link network {}",
            payment.network, link.network
        )));
    }

    let settlement = state
        .engine
        .verify_and_settle(&payment, link.amount, link.recipient)
        .await;
    if let Some(error) = settlement.error() {
        return link_payment_failed(error);
    }
    Json(json!({
        "success": true,
        "transaction": settlement.transaction(),
        "network": settlement.network(),
        "message": format!("Successfully paid {} USDC to {}", link.display_amount(), link.recipient),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::NetworkRegistry;
    use crate::settlement::tests::{MERCHANT, MockLedger, PAYER, SingleLedger, Submission};
    use crate::timestamp::UnixTimestamp;
    use alloy_primitives::TxHash;
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(mode: SettlementMode) -> Router {
        let networks = NetworkRegistry::default();
        let state = AppState {
            engine: SettlementEngine::new(networks.clone(), mode, Duration::from_secs(5)),
            requirements: RequirementsBuilder::new(networks, "Push AI"),
            pay_to: MERCHANT,
            price: TokenAmount::from(100_000u64),
            network: "base".to_string(),
            service_name: "Push AI".to_string(),
        };
        routes(Arc::new(state))
    }

    fn demo_app() -> Router {
        app(SettlementMode::Simulated)
    }

    fn live_app(ledger: Arc<MockLedger>) -> Router {
        app(SettlementMode::Live(Arc::new(SingleLedger(ledger))))
    }

    /// A payment valid right now, for `amount` to `to`.
    fn payment_header(to: Address, amount: u64) -> String {
        let mut payment = crate::settlement::tests::payment();
        let authorization = payment.payload.authorization.as_mut().unwrap();
        authorization.to = to;
        authorization.value = TokenAmount::from(amount);
        authorization.valid_after = UnixTimestamp::from_secs(0);
        authorization.valid_before = UnixTimestamp::now() + 3600;
        header::encode(&payment).unwrap()
    }

    async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, Option<String>, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let payment_response = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, payment_response, json)
    }

    fn get_request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, payment: Option<&str>, body: Value) -> HttpRequest<Body> {
        let mut builder = HttpRequest::post(uri).header("content-type", "application/json");
        if let Some(payment) = payment {
            builder = builder.header(PAYMENT_HEADER, payment);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn process_without_payment_returns_terms() {
        let (status, payment_response, json) = send(
            demo_app(),
            post_json("/process", None, json!({ "message": "gas on base?" })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert!(payment_response.is_none());
        assert_eq!(json["status"], "payment_required");
        assert_eq!(json["paymentInfo"]["maxAmountRequired"], "100000");
        assert_eq!(json["paymentInfo"]["resource"], "/process");
        assert_eq!(json["paymentInfo"]["network"], "base");
        assert_eq!(json["paymentInfo"]["extra"]["name"], "Push AI");
    }

    #[tokio::test]
    async fn process_with_undecodable_payment_fails() {
        let (status, _, json) = send(
            demo_app(),
            post_json("/process", Some("not-base64!!"), json!({ "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["status"], "payment_failed");
        assert_eq!(json["errorKind"], "malformed_payload");
    }

    #[tokio::test]
    async fn process_with_payment_in_demo_mode() {
        let header = payment_header(MERCHANT, 100_000);
        let (status, payment_response, json) = send(
            demo_app(),
            post_json("/process", Some(&header), json!({ "message": "gas on base?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["payment"]["settled"], true);
        let transaction = json["payment"]["transaction"].as_str().unwrap();
        assert!(transaction.starts_with("demo_"), "{transaction}");

        let payment_response = payment_response.unwrap();
        let decoded = Base64Bytes::from(payment_response.as_str()).decode().unwrap();
        let settlement: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(settlement["success"], true);
        assert_eq!(settlement["transaction"], transaction);
        assert_eq!(settlement["network"], "base");
    }

    #[tokio::test]
    async fn process_with_payment_settles_on_chain() {
        let ledger = Arc::new(MockLedger::new(1_000_000, Submission::Mined));
        let header = payment_header(MERCHANT, 100_000);
        let (status, payment_response, json) = send(
            live_app(ledger.clone()),
            post_json("/process", Some(&header), json!({ "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["payment"]["transaction"],
            TxHash::repeat_byte(0xab).to_string()
        );
        assert!(payment_response.is_some());
        assert_eq!(ledger.submitted.lock().unwrap().len(), 1);
        assert_eq!(ledger.submitted.lock().unwrap()[0].from, PAYER);
    }

    #[tokio::test]
    async fn process_with_wrong_recipient_never_reaches_the_chain() {
        let ledger = Arc::new(MockLedger::new(1_000_000, Submission::Mined));
        let stranger = alloy_primitives::address!("0x3333333333333333333333333333333333333333");
        let header = payment_header(stranger, 100_000);
        let (status, _, json) = send(
            live_app(ledger.clone()),
            post_json("/process", Some(&header), json!({ "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["errorKind"], "terms_violation");
        assert_eq!(ledger.calls(), 0);
    }

    #[tokio::test]
    async fn process_requires_a_message() {
        let header = payment_header(MERCHANT, 100_000);
        let (status, _, json) =
            send(demo_app(), post_json("/process", Some(&header), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Message is required");
    }

    #[tokio::test]
    async fn health_reports_mode_and_networks() {
        let (status, _, json) = send(demo_app(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["payment"]["price"], "$0.10");
        assert_eq!(json["payment"]["priceRaw"], "100000");
        assert_eq!(json["payment"]["networkName"], "Base");
        assert_eq!(json["payment"]["chainId"], 8453);
        assert_eq!(json["payment"]["productionMode"], false);
        assert_eq!(json["networkCount"], 7);

        let ledger = Arc::new(MockLedger::new(0, Submission::Mined));
        let (_, _, json) = send(live_app(ledger), get_request("/health")).await;
        assert_eq!(json["payment"]["productionMode"], true);
    }

    #[tokio::test]
    async fn merchant_status_in_both_modes() {
        let (_, _, json) = send(demo_app(), get_request("/merchant-status")).await;
        assert_eq!(json["mode"], "demo");
        assert_eq!(json["productionReady"], false);

        let ledger = Arc::new(MockLedger::new(2_500_000, Submission::Mined));
        let (status, _, json) = send(live_app(ledger), get_request("/merchant-status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "production");
        assert_eq!(json["nativeBalance"], "0.01");
        assert_eq!(json["usdcBalance"], "2.5");
        assert_eq!(json["hasGas"], true);
        assert_eq!(json["warning"], Value::Null);
    }

    #[tokio::test]
    async fn payment_info_and_networks() {
        let (_, _, json) = send(demo_app(), get_request("/payment-info")).await;
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["scheme"], "exact");
        assert_eq!(json["maxTimeoutSeconds"], 3600);

        let (_, _, json) = send(demo_app(), get_request("/api/networks")).await;
        assert_eq!(json["polygon"]["chainId"], 137);
    }

    #[tokio::test]
    async fn payment_link_lifecycle() {
        let recipient = MERCHANT.to_string();
        let (status, _, created) = send(
            demo_app(),
            post_json(
                "/api/payment-link/create",
                None,
                json!({ "amount": "0.10", "recipient": recipient, "description": "Coffee" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["data"]["amountRaw"], "100000");
        let link_id = created["linkId"].as_str().unwrap().to_string();
        assert_eq!(created["link"], format!("/pay/{link_id}"));

        let (status, _, link) =
            send(demo_app(), get_request(&format!("/api/payment-link/{link_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(link["amount"], "0.10");
        assert_eq!(link["networkName"], "Base");
        assert_eq!(link["description"], "Coffee");

        let (status, _, executed) = send(
            demo_app(),
            post_json(
                "/api/payment-link/execute",
                None,
                json!({ "linkId": link_id, "paymentHeader": payment_header(MERCHANT, 100_000) }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(executed["success"], true);
        assert_eq!(
            executed["message"],
            format!("Successfully paid 0.10 USDC to {MERCHANT}")
        );
    }

    #[tokio::test]
    async fn payment_link_execution_reports_sub_cent_amounts_exactly() {
        let link = PaymentLink {
            version: 1,
            recipient: MERCHANT,
            amount: TokenAmount::from(5_000u64),
            network: "base".to_string(),
            description: String::new(),
            created_at: 0,
        };
        let (status, _, executed) = send(
            demo_app(),
            post_json(
                "/api/payment-link/execute",
                None,
                json!({
                    "linkId": link.encode().unwrap(),
                    "paymentHeader": payment_header(MERCHANT, 5_000),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            executed["message"],
            format!("Successfully paid 0.005 USDC to {MERCHANT}")
        );
    }

    #[tokio::test]
    async fn payment_link_accepts_numeric_amounts() {
        let (status, _, created) = send(
            demo_app(),
            post_json(
                "/api/payment-link/create",
                None,
                json!({ "amount": 2.5, "recipient": MERCHANT.to_string() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["data"]["amountRaw"], "2500000");
    }

    #[tokio::test]
    async fn payment_link_rejects_bad_input() {
        let (status, _, json) = send(
            demo_app(),
            post_json("/api/payment-link/create", None, json!({ "amount": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Amount and recipient are required");

        let (status, _, json) = send(
            demo_app(),
            post_json(
                "/api/payment-link/create",
                None,
                json!({ "amount": "1", "recipient": "0xnope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid recipient address");

        let (status, _, json) =
            send(demo_app(), get_request("/api/payment-link/garbage!")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid payment link");
    }

    #[tokio::test]
    async fn payment_link_execution_enforces_link_terms() {
        let link = PaymentLink {
            version: 1,
            recipient: MERCHANT,
            amount: TokenAmount::from(500_000u64),
            network: "base".to_string(),
            description: String::new(),
            created_at: 0,
        };
        let (status, _, json) = send(
            demo_app(),
            post_json(
                "/api/payment-link/execute",
                None,
                json!({
                    "linkId": link.encode().unwrap(),
                    "paymentHeader": payment_header(MERCHANT, 100_000),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "terms_violation");
    }
}
