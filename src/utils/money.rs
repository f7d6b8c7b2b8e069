// Utilitários para manipulação de valores monetários
//
// Amounts are plain f64. No currency rounding is applied anywhere.

/// Total charge for `quantity` units at `unit_price`.
pub fn total_price(unit_price: f64, quantity: f64) -> f64 {
    unit_price * quantity
}

/// A usable price is finite and strictly positive.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_total_price() {
        assert_eq!(total_price(50.0, 2.0), 100.0);
        assert_eq!(total_price(19.99, 1.0), 19.99);
    }

    #[test]
    fn test_total_price_is_not_rounded() {
        // Binary floating point leaks through on purpose.
        assert_eq!(total_price(0.1, 3.0), 0.30000000000000004);
        assert_ne!(total_price(0.1, 3.0), 0.3);
    }

    #[test]
    fn test_is_valid_price() {
        assert!(is_valid_price(0.01));
        assert!(!is_valid_price(0.0));
        assert!(!is_valid_price(-50.0));
        assert!(!is_valid_price(f64::NAN));
        assert!(!is_valid_price(f64::INFINITY));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(100.0), "100.00");
        assert_eq!(format_amount(25.5), "25.50");
    }

    proptest! {
        #[test]
        fn total_of_valid_inputs_is_positive(unit in 0.01f64..1.0e6, qty in 0.001f64..1.0e4) {
            let total = total_price(unit, qty);
            prop_assert!(is_valid_price(total));
            prop_assert_eq!(total, unit * qty);
        }
    }
}
