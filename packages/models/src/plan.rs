//! Regional plans governing resource use.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tethys_geometry::Geometry;
use tethys_identity::IdHasher;

use crate::Record;
use crate::validation::{Rule, Violation, Violations};

/// A regional plan and the authority that administers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Short identifier of the plan.
    pub plan_id: String,
    /// Full title.
    pub plan_name: String,
    /// Day the plan took effect.
    pub commencement_date: NaiveDate,
    /// Council or agency administering the plan.
    pub plan_authority: String,
    /// Area the plan applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Geometry>,
    /// Ids of the stations the plan sets rules for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stations: Option<Vec<String>>,
}

impl Record for Plan {
    const KIND: &'static str = "plan";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        v.not_empty("plan_id", &self.plan_id);
        v.not_empty("plan_name", &self.plan_name);
        v.not_empty("plan_authority", &self.plan_authority);

        for e in self.extent.iter().flat_map(Geometry::errors) {
            v.push("extent", Rule::InvalidGeometry, e.to_string());
        }

        let hasher = IdHasher::default();
        for (index, id) in self.stations.iter().flatten().enumerate() {
            v.ensure(
                hasher.is_id(id),
                &format!("stations[{index}]"),
                Rule::Malformed,
                format!("{id:?} is not a station id"),
            );
        }
        v.into_vec()
    }
}
