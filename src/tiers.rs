use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Subscription tier. Ordering is the upgrade ladder: a user can only buy
/// tiers strictly above their current one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum Tier {
    Basic,
    Pro,
    Premium,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Basic
    }
}

/// Everything a tier entitles a user to for one calendar month.
#[derive(Debug, Clone, Copy)]
pub struct TierPlan {
    pub model: &'static str,
    pub message_limit: u32,
    pub photo_limit: u32,
    pub image_limit: u32,
    /// Monthly price in whole UZS. `None` for the free tier.
    pub price_uzs: Option<u32>,
}

impl Tier {
    /// The plan mapping is closed: every variant returns a full entry.
    #[must_use]
    pub fn plan(self) -> TierPlan {
        match self {
            Tier::Basic => TierPlan {
                model: "gpt-4o-mini",
                message_limit: 500,
                photo_limit: 50,
                image_limit: 30,
                price_uzs: None,
            },
            Tier::Pro => TierPlan {
                model: "gpt-4o",
                message_limit: 500,
                photo_limit: 100,
                image_limit: 60,
                price_uzs: Some(129_000),
            },
            Tier::Premium => TierPlan {
                model: "gpt-4o",
                message_limit: 1000,
                photo_limit: 150,
                image_limit: 100,
                price_uzs: Some(219_000),
            },
        }
    }

    /// Tiers strictly above this one, with their prices — the upgrade menu.
    #[must_use]
    pub fn upgrades(self) -> Vec<(Tier, u32)> {
        Tier::iter()
            .filter(|tier| *tier > self)
            .filter_map(|tier| tier.plan().price_uzs.map(|price| (tier, price)))
            .collect()
    }
}

/// Startup check: a gap in the plan table is a configuration defect, not a
/// runtime lookup failure. Fails fast before any transport starts.
pub fn validate_plan_table() -> Result<(), ConfigError> {
    for tier in Tier::iter() {
        let plan = tier.plan();
        if plan.model.is_empty() {
            return Err(ConfigError::PlanTable(format!("{tier}: empty model name")));
        }
        if plan.message_limit == 0 || plan.photo_limit == 0 || plan.image_limit == 0 {
            return Err(ConfigError::PlanTable(format!("{tier}: zero limit entry")));
        }
        if tier != Tier::Basic && plan.price_uzs.is_none() {
            return Err(ConfigError::PlanTable(format!("{tier}: paid tier without price")));
        }
    }

    // The upgrade ladder must be strictly priced upward.
    let mut last_price = 0u32;
    for tier in Tier::iter() {
        if let Some(price) = tier.plan().price_uzs {
            if price <= last_price {
                return Err(ConfigError::PlanTable(format!(
                    "{tier}: price {price} not above previous tier"
                )));
            }
            last_price = price;
        }
    }

    Ok(())
}
