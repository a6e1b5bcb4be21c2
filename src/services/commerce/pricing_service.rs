use crate::{errors::ServiceError, services::commerce::cart_transform::Customizations};
use rust_decimal::{prelude::FromPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed charge added to every configured piece.
pub const DEFAULT_BASE_PRICE: Decimal = dec!(8700);

/// Default absolute tolerance between client and server prices.
pub const DEFAULT_PRICE_TOLERANCE: Decimal = dec!(0.01);

/// Materials the configurator can price, with their rate per liter of volume.
pub const MATERIAL_RATES: &[(&str, Decimal)] = &[
    ("wood", dec!(200)),
    ("oak", dec!(260)),
    ("walnut", dec!(320)),
    ("pine", dec!(150)),
    ("birch", dec!(180)),
    ("mdf", dec!(120)),
    ("metal", dec!(280)),
    ("glass", dec!(350)),
];

pub fn is_supported_material(material: &str) -> bool {
    MATERIAL_RATES
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(material))
}

/// Converts a client supplied number into money. Non-finite input has no
/// decimal form.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub base_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub material_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume_liters: Decimal,
    pub material: String,
}

/// Authoritative price for a configuration. Pure and synchronous.
pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        width_cm: f64,
        depth_cm: f64,
        height_cm: f64,
        material: &str,
    ) -> Result<PriceQuote, ServiceError>;
}

/// Volume based pricing: `base + liters * rate(material)`, rounded half away
/// from zero to whole units.
#[derive(Debug, Clone)]
pub struct MaterialRatePricing {
    base_price: Decimal,
    rates: HashMap<String, Decimal>,
}

impl Default for MaterialRatePricing {
    fn default() -> Self {
        Self {
            base_price: DEFAULT_BASE_PRICE,
            rates: MATERIAL_RATES
                .iter()
                .map(|(name, rate)| (name.to_string(), *rate))
                .collect(),
        }
    }
}

impl MaterialRatePricing {
    pub fn new(base_price: Decimal, rates: HashMap<String, Decimal>) -> Self {
        Self {
            base_price,
            rates: rates
                .into_iter()
                .map(|(name, rate)| (name.to_ascii_lowercase(), rate))
                .collect(),
        }
    }
}

fn dimension(name: &str, value: f64) -> Result<Decimal, ServiceError> {
    decimal_from_f64(value)
        .ok_or_else(|| ServiceError::ValidationError(format!("{name} is not a finite number")))
}

impl PricingEngine for MaterialRatePricing {
    fn price(
        &self,
        width_cm: f64,
        depth_cm: f64,
        height_cm: f64,
        material: &str,
    ) -> Result<PriceQuote, ServiceError> {
        let material = material.to_ascii_lowercase();
        let rate = self.rates.get(&material).copied().ok_or_else(|| {
            ServiceError::ValidationError(format!("Unsupported material: {material}"))
        })?;

        let volume_liters = dimension("width_cm", width_cm)?
            * dimension("depth_cm", depth_cm)?
            * dimension("height_cm", height_cm)?
            / dec!(1000);
        let material_cost = volume_liters * rate;
        let total = (self.base_price + material_cost)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        Ok(PriceQuote {
            total,
            base_price: self.base_price,
            material_cost,
            volume_liters,
            material,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceVerification {
    pub is_valid: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub server_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub client_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub difference: Decimal,
}

/// Recomputes the price of a configuration and compares it with what the
/// browser submitted.
#[derive(Clone)]
pub struct PriceReverifier {
    engine: Arc<dyn PricingEngine>,
    tolerance: Decimal,
}

impl PriceReverifier {
    pub fn new(engine: Arc<dyn PricingEngine>, tolerance: Decimal) -> Self {
        Self {
            engine,
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    pub fn reverify(&self, customizations: &Customizations) -> Result<PriceVerification, ServiceError> {
        let quote = self.engine.price(
            customizations.width_cm,
            customizations.depth_cm,
            customizations.height_cm,
            &customizations.material,
        )?;

        let client_price = decimal_from_f64(customizations.calculated_price).ok_or_else(|| {
            ServiceError::ValidationError("calculated_price is not a finite number".into())
        })?;
        let difference = (quote.total - client_price).abs();
        let is_valid = difference <= self.tolerance;

        if is_valid {
            debug!(server_price = %quote.total, "Client price verified");
        } else {
            warn!(
                server_price = %quote.total,
                client_price = %client_price,
                difference = %difference,
                "Client price does not match server price"
            );
        }

        Ok(PriceVerification {
            is_valid,
            server_price: quote.total,
            client_price,
            difference,
        })
    }
}

impl Default for PriceReverifier {
    fn default() -> Self {
        Self::new(Arc::new(MaterialRatePricing::default()), DEFAULT_PRICE_TOLERANCE)
    }
}
