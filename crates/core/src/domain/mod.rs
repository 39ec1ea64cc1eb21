pub mod issue;
pub mod short_code;
