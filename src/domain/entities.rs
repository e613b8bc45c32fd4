//! Domain entities: core data structures

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::error::{DomainError, DomainResult};

const MAX_NAME_LEN: usize = 100;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Identity of a network element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed-point amount with exactly two decimal places.
///
/// Serializes as a decimal string (`"100.00"`), deserializes from a string
/// or a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Round to cents. Midpoints round to even, as `Decimal::round_dp` does.
    pub fn new(amount: Decimal) -> Self {
        let mut amount = amount.round_dp(2);
        amount.rescale(2);
        Self(amount)
    }

    /// Whole units, e.g. `Money::from_units(100)` is `100.00`.
    pub fn from_units(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    /// Cents, e.g. `Money::from_cents(15012)` is `150.12`.
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self::new)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct MoneyVisitor;

impl Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount as string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Ok(Money::new(Decimal::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Ok(Money::new(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Decimal::try_from(v).map(Money::new).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

/// Contact and address fields of a network element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub street: String,
    pub building: String,
}

impl Contact {
    /// Record-level checks: non-empty bounded name, plausible email.
    /// Address fields stay opaque.
    pub fn validate(&self) -> DomainResult<()> {
        validate_name("name", &self.name)?;
        validate_email(&self.email)
    }
}

pub(crate) fn validate_name(field: &'static str, name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::invalid(field, "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::invalid(
            field,
            format!("longer than {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> DomainResult<()> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(DomainError::invalid(
            "email",
            format!("not a valid address: '{email}'"),
        ))
    }
}

/// A node of the distribution network (manufacturer, distributor, retailer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkElement {
    pub id: ElementId,
    #[serde(flatten)]
    pub contact: Contact,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub debt_to_parent: Money,
    /// Derived from the parent chain, never supplied by callers.
    #[serde(default)]
    pub network_lvl: u32,
    pub parent: Option<ElementId>,
    #[serde(default)]
    pub products: BTreeSet<ProductId>,
}

impl NetworkElement {
    pub fn new(id: ElementId, contact: Contact, parent: Option<ElementId>) -> Self {
        Self {
            id,
            contact,
            created_at: Utc::now(),
            debt_to_parent: Money::ZERO,
            network_lvl: 0,
            parent,
            products: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.contact.name
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Display for NetworkElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [lvl {}, debt {}]",
            self.id,
            self.name(),
            self.network_lvl,
            self.debt_to_parent
        )
    }
}

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub model: Option<String>,
    pub release_date: Option<NaiveDate>,
}

impl Product {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name("product name", &self.name)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)?;
        if let Some(model) = &self.model {
            write!(f, " ({model})")?;
        }
        if let Some(date) = &self.release_date {
            write!(f, ", released {date}")?;
        }
        Ok(())
    }
}
