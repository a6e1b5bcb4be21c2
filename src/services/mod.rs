// Commerce (pricing, transform, checkout client, commit orchestration)
pub mod commerce;
