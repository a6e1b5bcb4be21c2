/// Commerce services module - cart commit pipeline to the external checkout
pub mod cart_commit_service;
pub mod cart_transform;
pub mod checkout_client;
pub mod pricing_service;

// Re-export services for convenience
pub use cart_commit_service::{CartCommitService, CommitOutcome};
pub use cart_transform::{CartItemData, CartTransformer, Customizations, ExternalCartItem};
pub use checkout_client::{
    ExternalApiError, ExternalCheckoutClient, HttpCheckoutTransport, MockCheckoutTransport,
};
pub use pricing_service::{MaterialRatePricing, PriceReverifier, PricingEngine};
