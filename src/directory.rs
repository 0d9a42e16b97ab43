//! Static directory of chains and their locations.

use crate::ChainLocation;
use crate::error::ApiError;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Chain {
    pub key: &'static str,
    pub name: &'static str,
    pub locations: &'static [ChainLocation],
}

impl Chain {
    pub fn location(&self, location_id: &str) -> Option<&ChainLocation> {
        self.locations.iter().find(|l| l.location_id == location_id)
    }
}

const fn location(
    chain_key: &'static str,
    location_id: &'static str,
    name: &'static str,
    city_slug: &'static str,
    url_slug: &'static str,
) -> ChainLocation {
    ChainLocation {
        chain_key,
        location_id,
        name,
        city_slug,
        url_slug,
    }
}

static CINEMA_CITY: [ChainLocation; 4] = [
    location("cinemacity", "1806", "Cinema City AFI Cotroceni", "bucuresti", "afi-cotroceni"),
    location("cinemacity", "1825", "Cinema City Sun Plaza", "bucuresti", "sun-plaza"),
    location("cinemacity", "1807", "Cinema City Iulius Mall Cluj", "cluj-napoca", "iulius-mall-cluj"),
    location("cinemacity", "1815", "Cinema City Palas Iași", "iasi", "palas-iasi"),
];

static CINEPLEXX: [ChainLocation; 3] = [
    location("cineplexx", "2101", "Cineplexx Băneasa", "bucuresti", "baneasa"),
    location("cineplexx", "2102", "Cineplexx Promenada", "bucuresti", "promenada"),
    location("cineplexx", "2110", "Cineplexx Timișoara", "timisoara", "timisoara"),
];

static HAPPY_CINEMA: [ChainLocation; 3] = [
    location("happycinema", "1", "Happy Cinema Ploiești", "ploiesti", "ploiesti-afi"),
    location("happycinema", "4", "Happy Cinema Suceava", "suceava", "suceava-iulius"),
    location("happycinema", "7", "Happy Cinema Brașov", "brasov", "brasov-coresi"),
];

/// Row of the flattened chain × location listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CinemaEntry {
    pub id: String,
    pub chain: &'static str,
    pub chain_name: &'static str,
    pub location_id: &'static str,
    pub name: &'static str,
    pub city: &'static str,
}

#[derive(Debug, Clone)]
pub struct CinemaDirectory {
    chains: Vec<Chain>,
}

impl CinemaDirectory {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self { chains }
    }

    /// The chains this build knows how to scrape.
    pub fn standard() -> Self {
        Self::new(vec![
            Chain {
                key: "cinemacity",
                name: "Cinema City",
                locations: &CINEMA_CITY,
            },
            Chain {
                key: "cineplexx",
                name: "Cineplexx",
                locations: &CINEPLEXX,
            },
            Chain {
                key: "happycinema",
                name: "Happy Cinema",
                locations: &HAPPY_CINEMA,
            },
        ])
    }

    pub fn chain(&self, key: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.key == key)
    }

    /// Resolve `"<chainKey>-<locationId>"`.
    pub fn resolve(&self, cinema_id: &str) -> Result<&ChainLocation, ApiError> {
        let (chain_key, location_id) = cinema_id.split_once('-').ok_or(ApiError::ChainNotFound)?;
        let chain = self.chain(chain_key).ok_or(ApiError::ChainNotFound)?;
        chain.location(location_id).ok_or(ApiError::LocationNotFound)
    }

    pub fn entries(&self) -> Vec<CinemaEntry> {
        self.chains
            .iter()
            .flat_map(|chain| {
                chain.locations.iter().map(move |l| CinemaEntry {
                    id: format!("{}-{}", chain.key, l.location_id),
                    chain: chain.key,
                    chain_name: chain.name,
                    location_id: l.location_id,
                    name: l.name,
                    city: l.city_slug,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_cinema() {
        let dir = CinemaDirectory::standard();
        let loc = dir.resolve("cinemacity-1806").unwrap();
        assert_eq!(loc.name, "Cinema City AFI Cotroceni");
        assert_eq!(loc.chain_key, "cinemacity");
    }

    #[test]
    fn unknown_chain_and_location_are_distinguished() {
        let dir = CinemaDirectory::standard();
        assert!(matches!(dir.resolve("acme-9999"), Err(ApiError::ChainNotFound)));
        assert!(matches!(dir.resolve("cinemacity-9999"), Err(ApiError::LocationNotFound)));
        assert!(matches!(dir.resolve("cinemacity"), Err(ApiError::ChainNotFound)));
    }

    #[test]
    fn entries_are_flattened_with_ids() {
        let dir = CinemaDirectory::standard();
        let entries = dir.entries();
        assert_eq!(entries.len(), 10);
        assert!(entries.iter().any(|e| e.id == "happycinema-4" && e.chain_name == "Happy Cinema"));
        // every location belongs to the chain it is listed under
        for chain in ["cinemacity", "cineplexx", "happycinema"] {
            let c = dir.chain(chain).unwrap();
            assert!(c.locations.iter().all(|l| l.chain_key == chain));
        }
    }
}
