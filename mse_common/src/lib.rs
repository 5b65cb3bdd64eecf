mod naira;

pub mod op;

pub use naira::{Naira, NairaConversionError, KOBO_PER_NAIRA, NAIRA_CURRENCY_CODE};
