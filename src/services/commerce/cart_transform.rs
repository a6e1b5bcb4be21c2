//! Inbound cart item shape, its validation rules, and the vendor-facing
//! projection that leaves the process.

use crate::{
    errors::ServiceError,
    security::SecurityManager,
    services::commerce::pricing_service::is_supported_material,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(password|secret|token|api[_-]?key|credential|session|internal|user_?id|design_?id|owner|email)",
    )
    .expect("sensitive key pattern is valid")
});

fn default_quantity() -> u32 {
    1
}

fn validate_material(material: &str) -> Result<(), ValidationError> {
    if is_supported_material(material) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_material"))
    }
}

fn validate_breakdown(breakdown: &Value) -> Result<(), ValidationError> {
    match breakdown {
        Value::Object(_) => Ok(()),
        _ => Err(ValidationError::new("price_breakdown_must_be_object")),
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(ValidationError::new("name_required"))
    } else {
        Ok(())
    }
}

/// A priced configuration as submitted by the configurator UI.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CartItemData {
    #[serde(rename = "designId", alias = "design_id")]
    #[validate(length(min = 1, max = 128))]
    pub design_id: String,

    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,

    #[validate]
    pub customizations: Customizations,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Customizations {
    #[validate(range(min = 10.0, max = 400.0))]
    pub width_cm: f64,
    #[validate(range(min = 10.0, max = 200.0))]
    pub depth_cm: f64,
    #[validate(range(min = 10.0, max = 300.0))]
    pub height_cm: f64,
    #[validate(custom = "validate_material")]
    pub material: String,
    #[validate(range(min = 0.0))]
    pub calculated_price: f64,
    #[validate(custom = "validate_breakdown")]
    pub price_breakdown: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub color: Option<String>,
    #[validate(length(max = 200), custom = "validate_name")]
    pub name: String,
}

/// What the external checkout system sees. Carries no internal identifiers;
/// `reference_id` is a sealed cart id only this service can open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub specification: String,
    pub reference_id: String,
}

/// Builds the vendor payload for a verified item.
#[derive(Clone)]
pub struct CartTransformer {
    security: std::sync::Arc<SecurityManager>,
}

impl CartTransformer {
    pub fn new(security: std::sync::Arc<SecurityManager>) -> Self {
        Self { security }
    }

    /// `unit_price` must be the server-side price, never the client's.
    pub fn to_external(
        &self,
        user_id: &str,
        item: &CartItemData,
        unit_price: Decimal,
    ) -> Result<ExternalCartItem, ServiceError> {
        let c = &item.customizations;
        let reference_id = self
            .security
            .generate_cart_id(user_id, &item.design_id, None)?;

        Ok(ExternalCartItem {
            product_id: format!("custom-{}", c.material.to_ascii_lowercase()),
            name: c.name.trim().to_string(),
            quantity: item.quantity,
            unit_price,
            total_price: unit_price * Decimal::from(item.quantity),
            specification: specification_text(c),
            reference_id,
        })
    }

    /// Serializes the vendor item and strips anything that looks sensitive.
    pub fn outbound_payload(item: &ExternalCartItem) -> Result<Value, ServiceError> {
        let mut payload = serde_json::to_value(item)?;
        redact_sensitive(&mut payload);
        Ok(payload)
    }
}

/// Removes every object key matching the sensitive-key pattern, recursively.
/// Returns the number of keys removed.
pub fn redact_sensitive(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|key, _| !SENSITIVE_KEY.is_match(key));
            let mut removed = before - map.len();
            for nested in map.values_mut() {
                removed += redact_sensitive(nested);
            }
            removed
        }
        Value::Array(items) => items.iter_mut().map(redact_sensitive).sum(),
        _ => 0,
    }
}

fn specification_text(c: &Customizations) -> String {
    let mut lines = vec![
        format!("Custom {}", c.name.trim()),
        format!(
            "Dimensions (W x D x H): {} x {} x {} cm",
            format_cm(c.width_cm),
            format_cm(c.depth_cm),
            format_cm(c.height_cm)
        ),
        format!("Material: {}", c.material.to_ascii_lowercase()),
    ];
    if let Some(color) = c.color.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(format!("Color: {}", color.trim()));
    }
    lines.join("\n")
}

fn format_cm(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}
