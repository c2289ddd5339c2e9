use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use super::rfc3339;

pub const CURRENCIES: &str = "currencies";

/// Exchange rate of `code` against the base currency (USD).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub rate: f64,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CurrencyDto {
    pub code: String,
    pub rate: f64,
    pub updated_at: String,
}

impl From<Currency> for CurrencyDto {
    fn from(c: Currency) -> Self {
        CurrencyDto {
            code: c.code,
            rate: c.rate,
            updated_at: rfc3339(&c.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
}
