use serde::{Deserialize, Serialize};

/// Low-stock severity, derived from the current balance on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    OutOfStock,
    Low,
}

impl AlertLevel {
    /// `None` while `quantity` is above `min_quantity`.
    pub fn evaluate(quantity: u64, min_quantity: u64) -> Option<AlertLevel> {
        if quantity > min_quantity {
            None
        } else if quantity == 0 {
            Some(AlertLevel::OutOfStock)
        } else {
            Some(AlertLevel::Low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn above_minimum_is_not_an_alert() {
        assert_eq!(AlertLevel::evaluate(6, 5), None);
    }

    #[test]
    fn at_minimum_is_low() {
        assert_eq!(AlertLevel::evaluate(5, 5), Some(AlertLevel::Low));
        assert_eq!(AlertLevel::evaluate(1, 5), Some(AlertLevel::Low));
    }

    #[test]
    fn zero_is_out_of_stock_even_without_minimum() {
        assert_eq!(AlertLevel::evaluate(0, 0), Some(AlertLevel::OutOfStock));
        assert_eq!(AlertLevel::evaluate(0, 3), Some(AlertLevel::OutOfStock));
    }

    #[test]
    fn serializes_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlertLevel::OutOfStock).unwrap(),
            "\"out_of_stock\""
        );
    }
}
