//! Location scope resolution.
//!
//! A request's `{country, cluster, site}` scope is resolved to the concrete
//! set of location ids whose records it may see. The index is built from the
//! location table once and then consulted for every request; resolution is a
//! pure function of the index and the scope.

use std::collections::{BTreeMap, BTreeSet};

use fieldsync_types::{Location, LocationId, LocationScope, SyncError};

/// Errors produced while resolving a scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// No country was supplied.
    #[error("country is required")]
    MissingCountry,

    /// The country has no locations.
    #[error("unknown country: {0}")]
    UnknownCountry(String),

    /// The site does not belong to the requested country.
    #[error("site {site} is not a location of {country}")]
    SiteOutsideCountry {
        /// Requested site.
        site: String,
        /// Requested country.
        country: String,
    },

    /// No location carries the requested cluster attribute.
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    /// A location of the cluster lies in another country.
    #[error("cluster {cluster} has location {location} outside {country}")]
    ClusterOutsideCountry {
        /// Requested cluster.
        cluster: String,
        /// Requested country.
        country: String,
        /// First offending location.
        location: LocationId,
    },
}

impl From<ScopeError> for SyncError {
    fn from(err: ScopeError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

/// Lookup maps derived from the location table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationIndex {
    locations: BTreeMap<LocationId, Location>,
    by_country: BTreeMap<String, BTreeSet<LocationId>>,
    by_cluster: BTreeMap<String, BTreeSet<LocationId>>,
}

impl LocationIndex {
    /// Build the country and cluster maps from a location table.
    pub fn build(locations: impl IntoIterator<Item = Location>) -> Self {
        let mut index = Self::default();

        for location in locations {
            if let Some(country) = trimmed(location.country.as_deref()) {
                index
                    .by_country
                    .entry(country.to_string())
                    .or_default()
                    .insert(location.id.clone());
            }
            if let Some(cluster) = trimmed(location.cluster.as_deref()) {
                index
                    .by_cluster
                    .entry(cluster.to_string())
                    .or_default()
                    .insert(location.id.clone());
            }
            index.locations.insert(location.id.clone(), location);
        }

        index
    }

    /// Number of locations indexed.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// True when the location table was empty.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Country of a location, if the location exists and has one.
    pub fn country_of(&self, id: &LocationId) -> Option<&str> {
        self.locations
            .get(id)
            .and_then(|l| trimmed(l.country.as_deref()))
    }

    /// Resolve a scope to location ids.
    ///
    /// Precedence: a non-blank site, then a non-blank cluster, then the
    /// whole country. The country is always mandatory and must be known.
    pub fn resolve(&self, scope: &LocationScope) -> Result<BTreeSet<LocationId>, ScopeError> {
        let country = trimmed(scope.country.as_deref()).ok_or(ScopeError::MissingCountry)?;
        let in_country = self
            .by_country
            .get(country)
            .ok_or_else(|| ScopeError::UnknownCountry(country.to_string()))?;

        if let Some(site) = trimmed(scope.site.as_deref()) {
            let site_id = LocationId::new(site);
            if !in_country.contains(&site_id) {
                return Err(ScopeError::SiteOutsideCountry {
                    site: site.to_string(),
                    country: country.to_string(),
                });
            }
            return Ok(BTreeSet::from([site_id]));
        }

        if let Some(cluster) = trimmed(scope.cluster.as_deref()) {
            let members = self
                .by_cluster
                .get(cluster)
                .ok_or_else(|| ScopeError::UnknownCluster(cluster.to_string()))?;
            if let Some(outsider) = members.iter().find(|id| !in_country.contains(*id)) {
                return Err(ScopeError::ClusterOutsideCountry {
                    cluster: cluster.to_string(),
                    country: country.to_string(),
                    location: outsider.clone(),
                });
            }
            return Ok(members.clone());
        }

        Ok(in_country.clone())
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
