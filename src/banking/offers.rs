//! Product eligibility engine
//!
//! Rules-based matching of loan and account products against a customer's
//! savings balance and credit score. Deterministic, no I/O.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Credit score assumed when none is on file
pub const DEFAULT_CREDIT_SCORE: u32 = 650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Loan,
    Offer,
}

/// What a rule looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomerProfile {
    pub balance: f64,
    pub credit_score: u32,
}

/// A product the customer qualifies for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    #[serde(rename = "type")]
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenure_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_score: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub benefits: Vec<String>,
}

impl Product {
    fn named(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            max_amount: None,
            interest_rate: None,
            tenure_years: None,
            eligibility_score: None,
            credit_limit: None,
            min_amount: None,
            benefits: Vec::new(),
        }
    }

    fn loan(name: &str, description: &str, max: f64, rate: f64, years: u32, score: &str) -> Self {
        Self {
            max_amount: Some(max),
            interest_rate: Some(rate),
            tenure_years: Some(years),
            eligibility_score: Some(score.to_string()),
            ..Self::named(name, description)
        }
    }

    fn with_benefits(mut self, benefits: &[&str]) -> Self {
        self.benefits = benefits.iter().map(|b| b.to_string()).collect();
        self
    }
}

/// Eligibility sheet returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibleProducts {
    pub loans: Vec<Product>,
    pub offers: Vec<Product>,
    pub credit_score: u32,
    pub balance: f64,
}

pub trait EligibilityRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ProductKind;

    fn is_eligible(&self, profile: &CustomerProfile) -> bool;

    fn product(&self) -> Product;
}

/// Threshold rule over score and balance
pub struct ThresholdRule {
    name: &'static str,
    kind: ProductKind,
    min_score: Option<u32>,
    min_balance: Option<f64>,
    product: Product,
}

impl EligibilityRule for ThresholdRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ProductKind {
        self.kind
    }

    fn is_eligible(&self, profile: &CustomerProfile) -> bool {
        self.min_score.map_or(true, |s| profile.credit_score >= s)
            && self.min_balance.map_or(true, |b| profile.balance >= b)
    }

    fn product(&self) -> Product {
        self.product.clone()
    }
}

pub struct EligibilityEngine {
    rules: Vec<Box<dyn EligibilityRule>>,
}

impl EligibilityEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn EligibilityRule>) {
        self.rules.push(rule);
    }

    /// Standard retail catalogue
    pub fn standard() -> Self {
        let mut engine = Self::new();

        engine.add_rule(Box::new(ThresholdRule {
            name: "personal_loan",
            kind: ProductKind::Loan,
            min_score: Some(650),
            min_balance: Some(10_000.0),
            product: Product::loan(
                "Personal Loan",
                "Instant personal loan up to 5 lakh",
                500_000.0,
                10.5,
                5,
                "High",
            ),
        }));
        engine.add_rule(Box::new(ThresholdRule {
            name: "home_loan",
            kind: ProductKind::Loan,
            min_score: Some(700),
            min_balance: None,
            product: Product::loan(
                "Home Loan",
                "Home loan with flexible repayment",
                5_000_000.0,
                8.75,
                20,
                "High",
            ),
        }));
        engine.add_rule(Box::new(ThresholdRule {
            name: "car_loan",
            kind: ProductKind::Loan,
            min_score: Some(650),
            min_balance: None,
            product: Product::loan(
                "Car Loan",
                "Vehicle financing for new cars",
                1_500_000.0,
                9.25,
                7,
                "Medium",
            ),
        }));
        engine.add_rule(Box::new(ThresholdRule {
            name: "premium_credit_card",
            kind: ProductKind::Offer,
            min_score: Some(700),
            min_balance: None,
            product: Product {
                credit_limit: Some(200_000.0),
                ..Product::named("Premium Credit Card", "Premium card with travel and dining perks")
            }
            .with_benefits(&["5% cashback on dining", "Airport lounge access", "No annual fee"]),
        }));
        engine.add_rule(Box::new(ThresholdRule {
            name: "premium_savings",
            kind: ProductKind::Offer,
            min_score: None,
            min_balance: Some(50_000.0),
            product: Product::named("Premium Savings Account", "Upgrade to a premium savings tier")
                .with_benefits(&[
                    "Higher interest rate",
                    "Free ATM withdrawals",
                    "Dedicated relationship manager",
                ]),
        }));
        engine.add_rule(Box::new(ThresholdRule {
            name: "fixed_deposit",
            kind: ProductKind::Offer,
            min_score: None,
            min_balance: Some(100_000.0),
            product: Product {
                min_amount: Some(10_000.0),
                ..Product::named("Fixed Deposit", "High-yield fixed deposit")
            }
            .with_benefits(&["7.5% annual interest", "Flexible tenure", "Tax benefits"]),
        }));

        engine
    }

    pub fn evaluate(&self, profile: CustomerProfile) -> EligibleProducts {
        let mut loans = Vec::new();
        let mut offers = Vec::new();

        for rule in &self.rules {
            if !rule.is_eligible(&profile) {
                continue;
            }
            debug!(rule = rule.name(), "Eligibility rule matched");
            match rule.kind() {
                ProductKind::Loan => loans.push(rule.product()),
                ProductKind::Offer => offers.push(rule.product()),
            }
        }

        debug!(
            rule_count = self.rules.len(),
            loans = loans.len(),
            offers = offers.len(),
            "Eligibility evaluated"
        );

        EligibleProducts {
            loans,
            offers,
            credit_score: profile.credit_score,
            balance: profile.balance,
        }
    }
}

impl Default for EligibilityEngine {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_demo_customer() {
        let sheet = EligibilityEngine::standard().evaluate(CustomerProfile {
            balance: 23_450.0,
            credit_score: 720,
        });
        assert_eq!(names(&sheet.loans), vec!["Personal Loan", "Home Loan", "Car Loan"]);
        assert_eq!(names(&sheet.offers), vec!["Premium Credit Card"]);
    }

    #[test]
    fn test_default_score_low_balance() {
        let sheet = EligibilityEngine::standard().evaluate(CustomerProfile {
            balance: 5_000.0,
            credit_score: DEFAULT_CREDIT_SCORE,
        });
        assert_eq!(names(&sheet.loans), vec!["Car Loan"]);
        assert!(sheet.offers.is_empty());
    }

    #[test]
    fn test_wealthy_low_score() {
        let sheet = EligibilityEngine::standard().evaluate(CustomerProfile {
            balance: 150_000.0,
            credit_score: 600,
        });
        assert!(sheet.loans.is_empty());
        assert_eq!(
            names(&sheet.offers),
            vec!["Premium Savings Account", "Fixed Deposit"]
        );
    }

    #[test]
    fn test_product_serializes_type_field() {
        let sheet = EligibilityEngine::standard().evaluate(CustomerProfile {
            balance: 0.0,
            credit_score: 700,
        });
        let json = serde_json::to_value(&sheet.loans[0]).unwrap();
        assert_eq!(json["type"], "Home Loan");
        assert_eq!(json["interest_rate"], 8.75);
        assert!(json.get("credit_limit").is_none());
    }
}
