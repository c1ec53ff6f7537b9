//! REST client for a Stripe-compatible provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rental_types::domain::provider::Metadata;
use rental_types::domain::{
    CheckoutSession, PaymentIntent, ProviderEvent, Refund, SetupIntent, StoreAccount,
    SubAccountStatus,
};
use rental_types::ports::{
    CreateCheckoutSession, CreatePaymentIntent, CreateRefund, CreateSetupIntent, CreateSubAccount,
    GatewayError, GatewayFactory, PaymentGateway, RefundReason,
};
use rental_types::DomainError;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::signature;
use crate::wire::{
    self, WireAccount, WireAccountLink, WireCheckoutSession, WireErrorBody, WirePaymentIntent,
    WireRefund, WireSetupIntent,
};

/// Provider connection settings shared by every client.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// e.g. `https://api.stripe.com`
    pub api_base: String,
    pub secret_key: String,
    pub timeout: Duration,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            secret_key: secret_key.into(),
            timeout: Duration::from_secs(10),
            webhook_tolerance_secs: signature::DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Builds per-account clients over one shared connection pool.
#[derive(Clone)]
pub struct StripeGatewayFactory {
    http: Client,
    config: Arc<StripeConfig>,
}

impl StripeGatewayFactory {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }
}

impl GatewayFactory for StripeGatewayFactory {
    type Gateway = StripeGateway;

    fn platform(&self) -> StripeGateway {
        StripeGateway {
            http: self.http.clone(),
            config: self.config.clone(),
            account: None,
        }
    }

    fn for_store(&self, store: &StoreAccount) -> Result<StripeGateway, DomainError> {
        let account = store.chargeable_account()?;
        Ok(StripeGateway {
            http: self.http.clone(),
            config: self.config.clone(),
            account: Some(account.to_string()),
        })
    }
}

/// Client bound to one account: the platform, or a store sub-account.
#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    config: Arc<StripeConfig>,
    account: Option<String>,
}

/// Form-encoded request body with the provider's bracketed key syntax.
#[derive(Default)]
struct Form(Vec<(String, String)>);

impl Form {
    fn push(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    fn push_opt(&mut self, key: &str, value: Option<impl ToString>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    fn metadata(&mut self, prefix: &str, metadata: &Metadata) -> &mut Self {
        let mut entries: Vec<_> = metadata.iter().collect();
        entries.sort();
        for (k, v) in entries {
            self.push(format!("{prefix}[{k}]"), v);
        }
        self
    }
}

fn refund_reason(reason: RefundReason) -> &'static str {
    match reason {
        RefundReason::RequestedByCustomer => "requested_by_customer",
        RefundReason::Duplicate => "duplicate",
        RefundReason::Fraudulent => "fraudulent",
    }
}

impl StripeGateway {
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<Form>,
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.config.secret_key);
        if let Some(account) = &self.account {
            req = req.header("Stripe-Account", account);
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(form) = form {
            req = req.form(&form.0);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "Provider request failed");
            GatewayError::Unavailable(e.to_string())
        })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| GatewayError::InvalidPayload(e.to_string()));
        }

        let err = classify(status, &body);
        tracing::warn!(%method, path, %status, error = %err, "Provider returned an error");
        Err(err)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        self.send(Method::POST, path, Some(form), idempotency_key)
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.send(Method::GET, path, None, None).await
    }
}

/// Maps a non-2xx response into the provider-neutral taxonomy.
fn classify(status: StatusCode, body: &[u8]) -> GatewayError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::Unavailable(format!("provider returned {status}"));
    }

    match serde_json::from_slice::<WireErrorBody>(body) {
        Ok(WireErrorBody { error }) => GatewayError::Rejected {
            code: error.decline_code.or(error.code),
            message: error
                .message
                .unwrap_or_else(|| format!("provider returned {status}")),
        },
        Err(_) => GatewayError::Rejected {
            code: None,
            message: format!("provider returned {status}"),
        },
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_sub_account(
        &self,
        req: CreateSubAccount,
    ) -> Result<SubAccountStatus, GatewayError> {
        let mut form = Form::default();
        form.push("type", "express")
            .push("email", &req.email)
            .push("country", &req.country)
            .push("capabilities[card_payments][requested]", true)
            .push("capabilities[transfers][requested]", true);
        let account: WireAccount = self.post("accounts", form, None).await?;
        Ok(account.into())
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<String, GatewayError> {
        let mut form = Form::default();
        form.push("account", account_id)
            .push("return_url", return_url)
            .push("refresh_url", refresh_url)
            .push("type", "account_onboarding");
        let link: WireAccountLink = self.post("account_links", form, None).await?;
        Ok(link.url)
    }

    async fn get_sub_account_status(
        &self,
        account_id: &str,
    ) -> Result<SubAccountStatus, GatewayError> {
        let account: WireAccount = self.get(&format!("accounts/{account_id}")).await?;
        Ok(account.into())
    }

    async fn create_payment_intent(
        &self,
        req: CreatePaymentIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = Form::default();
        form.push("amount", req.amount)
            .push("currency", req.currency.as_str().to_ascii_lowercase())
            .push("payment_method_types[]", "card")
            .push_opt("customer", req.customer.as_ref())
            .push_opt("payment_method", req.payment_method.as_ref())
            .push_opt("description", req.description.as_ref())
            .metadata("metadata", &req.metadata);
        if req.manual_capture {
            form.push("capture_method", "manual");
        }
        let intent: WirePaymentIntent = self
            .post("payment_intents", form, req.idempotency_key.as_deref())
            .await?;
        intent.try_into()
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
        off_session: bool,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = Form::default();
        form.push("payment_method", payment_method);
        if off_session {
            form.push("off_session", true);
        }
        let intent: WirePaymentIntent = self
            .post(&format!("payment_intents/{intent_id}/confirm"), form, None)
            .await?;
        intent.try_into()
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let intent: WirePaymentIntent = self.get(&format!("payment_intents/{intent_id}")).await?;
        intent.try_into()
    }

    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount: Option<i64>,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = Form::default();
        form.push_opt("amount_to_capture", amount);
        let intent: WirePaymentIntent = self
            .post(&format!("payment_intents/{intent_id}/capture"), form, None)
            .await?;
        intent.try_into()
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let intent: WirePaymentIntent = self
            .post(
                &format!("payment_intents/{intent_id}/cancel"),
                Form::default(),
                None,
            )
            .await?;
        intent.try_into()
    }

    async fn create_setup_intent(
        &self,
        req: CreateSetupIntent,
    ) -> Result<SetupIntent, GatewayError> {
        let mut form = Form::default();
        form.push("usage", "off_session")
            .push("payment_method_types[]", "card")
            .push_opt("customer", req.customer.as_ref())
            .metadata("metadata", &req.metadata);
        let setup: WireSetupIntent = self
            .post("setup_intents", form, req.idempotency_key.as_deref())
            .await?;
        Ok(setup.into())
    }

    async fn retrieve_setup_intent(&self, setup_id: &str) -> Result<SetupIntent, GatewayError> {
        let setup: WireSetupIntent = self.get(&format!("setup_intents/{setup_id}")).await?;
        Ok(setup.into())
    }

    async fn cancel_setup_intent(&self, setup_id: &str) -> Result<SetupIntent, GatewayError> {
        let setup: WireSetupIntent = self
            .post(
                &format!("setup_intents/{setup_id}/cancel"),
                Form::default(),
                None,
            )
            .await?;
        Ok(setup.into())
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSession,
    ) -> Result<CheckoutSession, GatewayError> {
        let currency = req.currency.as_str().to_ascii_lowercase();
        let mut form = Form::default();
        form.push("mode", "payment")
            .push("success_url", &req.success_url)
            .push("cancel_url", &req.cancel_url)
            .push("expires_at", req.expires_at.timestamp())
            .push_opt("customer_email", req.customer_email.as_ref())
            .metadata("metadata", &req.metadata)
            .metadata("payment_intent_data[metadata]", &req.metadata);
        for (i, item) in req.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push(format!("{prefix}[quantity]"), item.quantity)
                .push(format!("{prefix}[price_data][currency]"), &currency)
                .push(format!("{prefix}[price_data][unit_amount]"), item.unit_amount)
                .push(format!("{prefix}[price_data][product_data][name]"), &item.name);
        }
        if req.save_payment_method {
            form.push("customer_creation", "always")
                .push("payment_intent_data[setup_future_usage]", "off_session");
        }
        let session: WireCheckoutSession = self
            .post("checkout/sessions", form, req.idempotency_key.as_deref())
            .await?;
        session.try_into()
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        let session: WireCheckoutSession = self
            .get(&format!(
                "checkout/sessions/{session_id}?expand[]=payment_intent"
            ))
            .await?;
        session.try_into()
    }

    async fn create_refund(&self, req: CreateRefund) -> Result<Refund, GatewayError> {
        let mut form = Form::default();
        form.push("charge", &req.charge)
            .push_opt("amount", req.amount)
            .push("reason", refund_reason(req.reason))
            .metadata("metadata", &req.metadata);
        let refund: WireRefund = self
            .post("refunds", form, req.idempotency_key.as_deref())
            .await?;
        Ok(refund.into())
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
    ) -> Result<ProviderEvent, GatewayError> {
        signature::verify(
            payload,
            signature_header,
            secret,
            self.config.webhook_tolerance_secs,
            Utc::now(),
        )?;
        wire::parse_event(payload)
    }
}
