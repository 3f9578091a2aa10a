//! Common data types.

use serde::{Deserialize, Serialize};

/// Civic-tech platform vendors the pipeline knows how to sync.
///
/// The string form is the tag stored on `cities.vendor` and used to key
/// HTTP sessions and rate-limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Primegov,
    Legistar,
    Granicus,
    CivicClerk,
    CivicPlus,
    CivicEngage,
    Escribe,
    Iqm2,
    OnBase,
    NovusAgenda,
    Municode,
    Chicago,
    Berkeley,
    MenloPark,
}

impl Vendor {
    pub const ALL: [Vendor; 14] = [
        Vendor::Primegov,
        Vendor::Legistar,
        Vendor::Granicus,
        Vendor::CivicClerk,
        Vendor::CivicPlus,
        Vendor::CivicEngage,
        Vendor::Escribe,
        Vendor::Iqm2,
        Vendor::OnBase,
        Vendor::NovusAgenda,
        Vendor::Municode,
        Vendor::Chicago,
        Vendor::Berkeley,
        Vendor::MenloPark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Primegov => "primegov",
            Vendor::Legistar => "legistar",
            Vendor::Granicus => "granicus",
            Vendor::CivicClerk => "civicclerk",
            Vendor::CivicPlus => "civicplus",
            Vendor::CivicEngage => "civicengage",
            Vendor::Escribe => "escribe",
            Vendor::Iqm2 => "iqm2",
            Vendor::OnBase => "onbase",
            Vendor::NovusAgenda => "novusagenda",
            Vendor::Municode => "municode",
            Vendor::Chicago => "chicago",
            Vendor::Berkeley => "berkeley",
            Vendor::MenloPark => "menlopark",
        }
    }

    pub fn parse(tag: &str) -> Option<Vendor> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "primegov" => Some(Vendor::Primegov),
            "legistar" => Some(Vendor::Legistar),
            "granicus" => Some(Vendor::Granicus),
            "civicclerk" => Some(Vendor::CivicClerk),
            "civicplus" => Some(Vendor::CivicPlus),
            "civicengage" => Some(Vendor::CivicEngage),
            "escribe" => Some(Vendor::Escribe),
            "iqm2" => Some(Vendor::Iqm2),
            "onbase" => Some(Vendor::OnBase),
            "novusagenda" => Some(Vendor::NovusAgenda),
            "municode" => Some(Vendor::Municode),
            "chicago" => Some(Vendor::Chicago),
            "berkeley" => Some(Vendor::Berkeley),
            "menlopark" => Some(Vendor::MenloPark),
            _ => None,
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Vendor::parse(s).ok_or_else(|| format!("unknown vendor tag: {s}"))
    }
}

/// Build the stable per-city identifier from city name and state.
///
/// `"Palo Alto", "CA"` becomes `paloaltoCA`.
pub fn city_banana(city_name: &str, state: &str) -> String {
    let name: String = city_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    format!("{}{}", name, state.trim().to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_round_trips_through_tag() {
        for vendor in Vendor::ALL {
            assert_eq!(Vendor::parse(vendor.as_str()), Some(vendor));
        }
    }

    #[test]
    fn vendor_parse_is_case_insensitive() {
        assert_eq!(Vendor::parse("PrimeGov"), Some(Vendor::Primegov));
        assert_eq!(Vendor::parse(" LEGISTAR "), Some(Vendor::Legistar));
        assert_eq!(Vendor::parse("unknown"), None);
    }

    #[test]
    fn banana_strips_punctuation_and_uppercases_state() {
        assert_eq!(city_banana("Palo Alto", "ca"), "paloaltoCA");
        assert_eq!(city_banana("St. Paul", "MN"), "stpaulMN");
        assert_eq!(city_banana("Winston-Salem", "nc"), "winstonsalemNC");
    }
}
