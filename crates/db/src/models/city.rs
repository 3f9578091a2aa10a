//! City models.

use common::Vendor;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CityStatus {
    Active,
    Inactive,
}

/// A city tracked by the pipeline.
///
/// Created by admin import, mutated only by admin tools. The `banana` is
/// the stable cross-system identifier (`paloaltoCA`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub banana: String,
    pub name: String,
    /// Two-letter state code.
    pub state: String,
    /// Vendor tag as stored; parse with [`City::vendor`].
    pub vendor: String,
    /// Vendor-local slug embedded in URLs (`cityofpaloalto`).
    pub slug: String,
    pub county: Option<String>,
    pub status: CityStatus,
    pub population: Option<i64>,
    pub zipcodes: Vec<String>,
}

impl City {
    /// Typed vendor tag, `None` when the stored tag is not one the
    /// pipeline recognizes.
    pub fn vendor(&self) -> Option<Vendor> {
        Vendor::parse(&self.vendor)
    }
}
