use axum::Json;
use serde::Serialize;

use crate::config;

/// key: catalog -> fixed amount-to-credits price table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    Starter,
    Business,
    Pro,
    Custom,
}

impl PackageType {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageType::Starter => "starter",
            PackageType::Business => "business",
            PackageType::Pro => "pro",
            PackageType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub credits: i64,
    pub package_type: PackageType,
}

const PRICE_TABLE: &[(i64, CreditPackage)] = &[
    (
        9,
        CreditPackage {
            credits: 3,
            package_type: PackageType::Starter,
        },
    ),
    (
        29,
        CreditPackage {
            credits: 10,
            package_type: PackageType::Business,
        },
    ),
    (
        79,
        CreditPackage {
            credits: 30,
            package_type: PackageType::Pro,
        },
    ),
];

/// Map a paid amount (whole currency units) to a credit grant. Amounts not in
/// the table indicate price drift between this service and the provider's
/// configured prices; they fall back to a proportional grant tagged `custom`.
pub fn lookup(amount: i64) -> CreditPackage {
    lookup_with_unit_price(amount, *config::CREDIT_UNIT_PRICE)
}

pub fn lookup_with_unit_price(amount: i64, unit_price: i64) -> CreditPackage {
    if let Some((_, package)) = PRICE_TABLE.iter().find(|(price, _)| *price == amount) {
        return *package;
    }
    let package = CreditPackage {
        credits: amount / unit_price,
        package_type: PackageType::Custom,
    };
    tracing::warn!(
        amount,
        credits = package.credits,
        "amount not in price table; falling back to proportional custom package"
    );
    package
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub amount: i64,
    pub credits: i64,
    pub package_type: PackageType,
}

pub async fn list_packages() -> Json<Vec<CatalogEntry>> {
    let entries = PRICE_TABLE
        .iter()
        .map(|(amount, package)| CatalogEntry {
            amount: *amount,
            credits: package.credits,
            package_type: package.package_type,
        })
        .collect();
    Json(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_amounts_map_to_fixed_packages() {
        assert_eq!(
            lookup_with_unit_price(9, 3),
            CreditPackage {
                credits: 3,
                package_type: PackageType::Starter
            }
        );
        assert_eq!(
            lookup_with_unit_price(29, 3),
            CreditPackage {
                credits: 10,
                package_type: PackageType::Business
            }
        );
        assert_eq!(
            lookup_with_unit_price(79, 3),
            CreditPackage {
                credits: 30,
                package_type: PackageType::Pro
            }
        );
    }

    #[test]
    fn unknown_amount_falls_back_proportionally() {
        let package = lookup_with_unit_price(50, 3);
        assert_eq!(package.package_type, PackageType::Custom);
        assert_eq!(package.credits, 16);
    }

    #[test]
    fn tiny_custom_amount_rounds_down_to_zero() {
        let package = lookup_with_unit_price(2, 3);
        assert_eq!(package.package_type, PackageType::Custom);
        assert_eq!(package.credits, 0);
    }
}
