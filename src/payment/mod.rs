use crate::error::PaymentError;
use crate::session::UserSession;
use crate::tiers::Tier;
use std::str::FromStr;

/// The payment collaborator bills in minor currency units.
pub const MINOR_UNIT_FACTOR: u32 = 100;

/// Fixed settlement currency for all providers.
pub const CURRENCY: &str = "UZS";

/// Configured payment providers, keyed name → credential.
pub const PROVIDERS: [&str; 3] = ["click", "payme", "stripe"];

/// Opaque invoice payload carried through the provider round-trip.
/// Encodes `(user_id, plan)` as `"<id>_<Plan>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentPayload {
    pub user_id: i64,
    pub plan: Tier,
}

impl PaymentPayload {
    #[must_use]
    pub fn encode(self) -> String {
        format!("{}_{}", self.user_id, self.plan)
    }

    pub fn decode(raw: &str) -> Result<Self, PaymentError> {
        let (id_raw, plan_raw) = raw
            .split_once('_')
            .ok_or_else(|| PaymentError::MalformedPayload(raw.to_string()))?;
        let user_id = id_raw
            .parse::<i64>()
            .map_err(|_| PaymentError::MalformedPayload(raw.to_string()))?;
        let plan = Tier::from_str(plan_raw)
            .map_err(|_| PaymentError::UnknownPlan(plan_raw.to_string()))?;
        Ok(Self { user_id, plan })
    }
}

/// Everything the transport needs to issue one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub provider_token: String,
    pub currency: &'static str,
    /// `price × MINOR_UNIT_FACTOR`.
    pub amount_minor: u64,
    pub label: String,
}

/// Plan → provider → invoice → precheckout → completion.
///
/// The workflow itself is stateless; progress lives in the callback data and
/// the invoice payload, so a crashed process never strands a purchase.
pub struct TierPaymentWorkflow {
    provider_tokens: Vec<(String, String)>,
}

impl TierPaymentWorkflow {
    pub fn new(provider_tokens: Vec<(String, String)>) -> Self {
        Self { provider_tokens }
    }

    /// Tiers strictly above `current`, with prices — the SelectPlan stage.
    #[must_use]
    pub fn upgrade_options(&self, current: Tier) -> Vec<(Tier, u32)> {
        current.upgrades()
    }

    /// The configured credential for a provider, if any. A provider without
    /// a credential never gets an invoice.
    #[must_use]
    pub fn provider_token(&self, provider: &str) -> Option<&str> {
        self.provider_tokens
            .iter()
            .find(|(name, _)| name == provider)
            .map(|(_, token)| token.as_str())
    }

    /// InvoiceSent stage: price the plan and wrap the opaque payload.
    pub fn build_invoice(
        &self,
        session: &UserSession,
        plan: Tier,
        provider: &str,
        title: String,
        description: String,
    ) -> Result<Invoice, PaymentError> {
        let token = self
            .provider_token(provider)
            .ok_or_else(|| PaymentError::ProviderUnavailable(provider.to_string()))?;
        let price = plan
            .plan()
            .price_uzs
            .ok_or_else(|| PaymentError::NotPurchasable(plan.to_string()))?;

        Ok(Invoice {
            title,
            description,
            payload: PaymentPayload {
                user_id: session.user_id,
                plan,
            }
            .encode(),
            provider_token: token.to_string(),
            currency: CURRENCY,
            amount_minor: u64::from(price) * u64::from(MINOR_UNIT_FACTOR),
            label: plan.to_string(),
        })
    }

    /// PreCheckoutValidated stage — the last veto point before funds move.
    /// Rejects with a human-readable reason unless the payload decodes to a
    /// known, priced plan.
    pub fn validate_precheckout(&self, payload: &str) -> Result<PaymentPayload, String> {
        let decoded = PaymentPayload::decode(payload).map_err(|err| err.to_string())?;
        if decoded.plan.plan().price_uzs.is_none() {
            return Err(PaymentError::NotPurchasable(decoded.plan.to_string()).to_string());
        }
        Ok(decoded)
    }

    /// Completed stage: set the tier idempotently. Returns true when the
    /// session changed (re-delivered success notifications are no-ops).
    pub fn apply_success(
        &self,
        session: &mut UserSession,
        payload: &str,
    ) -> Result<bool, PaymentError> {
        let decoded = PaymentPayload::decode(payload)?;
        if session.tier == decoded.plan {
            return Ok(false);
        }
        session.tier = decoded.plan;
        tracing::info!(
            user_id = session.user_id,
            tier = %decoded.plan,
            "tier upgraded after successful payment"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{MINOR_UNIT_FACTOR, PaymentPayload, TierPaymentWorkflow};
    use crate::session::UserSession;
    use crate::tiers::Tier;

    fn workflow() -> TierPaymentWorkflow {
        TierPaymentWorkflow::new(vec![
            ("click".to_string(), "click-token".to_string()),
            ("stripe".to_string(), "stripe-token".to_string()),
        ])
    }

    fn session() -> UserSession {
        UserSession::new(42, "Ada", "2024-06")
    }

    #[test]
    fn payload_round_trips() {
        let payload = PaymentPayload {
            user_id: 42,
            plan: Tier::Pro,
        };
        let encoded = payload.encode();
        assert_eq!(encoded, "42_Pro");
        assert_eq!(PaymentPayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(PaymentPayload::decode("no-separator").is_err());
        assert!(PaymentPayload::decode("abc_Pro").is_err());
        assert!(PaymentPayload::decode("42_Gold").is_err());
    }

    #[test]
    fn upgrade_options_exclude_current_and_below() {
        let workflow = workflow();
        assert_eq!(
            workflow.upgrade_options(Tier::Basic),
            vec![(Tier::Pro, 129_000), (Tier::Premium, 219_000)]
        );
        assert_eq!(
            workflow.upgrade_options(Tier::Pro),
            vec![(Tier::Premium, 219_000)]
        );
        assert!(workflow.upgrade_options(Tier::Premium).is_empty());
    }

    #[test]
    fn unconfigured_provider_never_gets_an_invoice() {
        let workflow = workflow();
        let err = workflow
            .build_invoice(
                &session(),
                Tier::Pro,
                "payme",
                "title".into(),
                "desc".into(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("payme"));
    }

    #[test]
    fn invoice_amount_uses_minor_units() {
        let workflow = workflow();
        let invoice = workflow
            .build_invoice(
                &session(),
                Tier::Premium,
                "click",
                "title".into(),
                "desc".into(),
            )
            .unwrap();

        assert_eq!(
            invoice.amount_minor,
            219_000 * u64::from(MINOR_UNIT_FACTOR)
        );
        assert_eq!(invoice.payload, "42_Premium");
        assert_eq!(invoice.provider_token, "click-token");
        assert_eq!(invoice.currency, "UZS");
    }

    #[test]
    fn free_tier_is_not_purchasable() {
        let workflow = workflow();
        let err = workflow
            .build_invoice(
                &session(),
                Tier::Basic,
                "click",
                "title".into(),
                "desc".into(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Basic"));
    }

    #[test]
    fn precheckout_vetoes_unknown_plan() {
        let workflow = workflow();
        let reason = workflow.validate_precheckout("42_Gold").unwrap_err();
        assert!(reason.contains("Gold"));
    }

    #[test]
    fn precheckout_accepts_known_priced_plan() {
        let workflow = workflow();
        let decoded = workflow.validate_precheckout("42_Pro").unwrap();
        assert_eq!(decoded.plan, Tier::Pro);
        assert_eq!(decoded.user_id, 42);
    }

    #[test]
    fn duplicate_success_notification_is_a_no_op() {
        let workflow = workflow();
        let mut session = session();

        assert!(workflow.apply_success(&mut session, "42_Pro").unwrap());
        assert_eq!(session.tier, Tier::Pro);

        assert!(!workflow.apply_success(&mut session, "42_Pro").unwrap());
        assert_eq!(session.tier, Tier::Pro);
    }

    #[test]
    fn failed_decode_leaves_session_untouched() {
        let workflow = workflow();
        let mut session = session();
        assert!(workflow.apply_success(&mut session, "garbage").is_err());
        assert_eq!(session.tier, Tier::Basic);
    }
}
