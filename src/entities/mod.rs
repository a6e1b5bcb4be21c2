pub mod design;
pub mod purchase_audit_log;
