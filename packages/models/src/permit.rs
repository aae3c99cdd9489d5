//! Resource consents (water permits) and their conditions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::Record;
use crate::station::Station;
use crate::validation::{Rule, Violation, Violations};

/// Time period a limit applies over.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Period {
    #[serde(rename = "S")]
    #[strum(serialize = "S")]
    Seconds,
    #[serde(rename = "H")]
    #[strum(serialize = "H")]
    Hours,
    #[serde(rename = "D")]
    #[strum(serialize = "D")]
    Days,
    #[serde(rename = "W")]
    #[strum(serialize = "W")]
    Weeks,
    #[serde(rename = "M")]
    #[strum(serialize = "M")]
    Months,
    #[serde(rename = "Y")]
    #[strum(serialize = "Y")]
    Years,
}

/// Volume units of a limit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Units {
    #[serde(rename = "l")]
    #[strum(serialize = "l")]
    Liters,
    #[serde(rename = "m3")]
    #[strum(serialize = "m3")]
    CubicMeters,
}

/// Whether a limit is a floor or a ceiling.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LimitBoundary {
    Min,
    Max,
}

/// Statistic a limit is evaluated against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregationStat {
    Min,
    Max,
    Median,
    Mean,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ConditionType {
    /// Caps the volume or rate that may be taken.
    #[serde(rename = "abstraction limit")]
    #[strum(serialize = "abstraction limit")]
    AbstractionLimit,
}

/// What the permit allows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ActivityType {
    #[serde(rename = "consumptive take water")]
    #[strum(serialize = "consumptive take water")]
    ConsumptiveTakeWater,
    #[serde(rename = "non-consumptive take water")]
    #[strum(serialize = "non-consumptive take water")]
    NonConsumptiveTakeWater,
    #[serde(rename = "divert water")]
    #[strum(serialize = "divert water")]
    DivertWater,
    #[serde(rename = "dam water")]
    #[strum(serialize = "dam water")]
    DamWater,
    #[serde(rename = "use water")]
    #[strum(serialize = "use water")]
    UseWater,
    #[serde(rename = "discharge water")]
    #[strum(serialize = "discharge water")]
    DischargeWater,
}

/// Stream depletion method assigned to a groundwater take.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SdMethod {
    #[serde(rename = "theis_1941")]
    #[strum(serialize = "theis_1941")]
    Theis1941,
    #[serde(rename = "hunt_1999")]
    #[strum(serialize = "hunt_1999")]
    Hunt1999,
    #[serde(rename = "hunt_2003")]
    #[strum(serialize = "hunt_2003")]
    Hunt2003,
    #[serde(rename = "hunt_2009")]
    #[strum(serialize = "hunt_2009")]
    Hunt2009,
    #[serde(rename = "ward_lough_2011")]
    #[strum(serialize = "ward_lough_2011")]
    WardLough2011,
}

/// The water body an activity applies to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Feature {
    #[serde(rename = "surface water")]
    #[strum(serialize = "surface water")]
    SurfaceWater,
    #[serde(rename = "groundwater")]
    #[strum(serialize = "groundwater")]
    Groundwater,
}

/// Lifecycle status of a permit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Status {
    Expired,
    Surrendered,
    Active,
    Archived,
    Lapsed,
    Superseded,
    Cancelled,
    /// Expired but still exercisable under section 124 of the RMA.
    #[serde(rename = "Expired - S.124 Protection")]
    #[strum(serialize = "Expired - S.124 Protection")]
    ExpiredS124,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum PermitType {
    /// Consent to take or use water.
    #[serde(rename = "water permit")]
    #[strum(serialize = "water permit")]
    WaterPermit,
}

/// A quantitative limit on an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub value: f64,
    pub period: Period,
    pub units: Units,
    pub limit_boundary: LimitBoundary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_stat: Option<AggregationStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: ConditionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Vec<Limit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Aquifer properties used by stream depletion calculations.
///
/// Transmissivities are in m2/day, conductivities in m/day and lengths in
/// metres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AquiferProp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<SdMethod>,
    /// Ratio of the take that depletes the stream, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_depletion_ratio: Option<f64>,
    /// Pumping days used for the depletion calculation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_days: Option<i64>,
    /// Distance from the pumped well to the stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sep_distance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pump_aq_trans: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pump_aq_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_aq_trans: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_aq_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_aq_trans: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_aq_s: Option<f64>,
    /// Aquitard hydraulic conductivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqt_k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqt_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqt_thick: Option<i64>,
    /// Streambed hydraulic conductivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_thick: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_width: Option<i64>,
}

impl AquiferProp {
    fn check(&self, v: &mut Violations) {
        if let Some(ratio) = self.stream_depletion_ratio
            && v.finite("stream_depletion_ratio", ratio)
        {
            v.ensure(
                (0.0..=1.0).contains(&ratio),
                "stream_depletion_ratio",
                Rule::OutOfRange,
                format!("{ratio} is outside [0, 1]"),
            );
        }

        for (field, value) in [
            ("n_days", self.n_days),
            ("sep_distance", self.sep_distance),
            ("pump_aq_trans", self.pump_aq_trans),
            ("upper_aq_trans", self.upper_aq_trans),
            ("lower_aq_trans", self.lower_aq_trans),
            ("aqt_thick", self.aqt_thick),
            ("stream_thick", self.stream_thick),
            ("stream_width", self.stream_width),
        ] {
            if let Some(value) = value {
                v.ensure(
                    value >= 0,
                    field,
                    Rule::Negative,
                    format!("{value} must not be negative"),
                );
            }
        }

        for (field, value) in [
            ("pump_aq_s", self.pump_aq_s),
            ("upper_aq_s", self.upper_aq_s),
            ("lower_aq_s", self.lower_aq_s),
            ("aqt_k", self.aqt_k),
            ("aqt_s", self.aqt_s),
            ("stream_k", self.stream_k),
        ] {
            if let Some(value) = value {
                v.non_negative(field, value);
            }
        }
    }
}

/// A permit's take or discharge point, carrying aquifer properties.
pub type PermitStation = Station<AquiferProp>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity_type: ActivityType,
    pub feature: Feature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_purpose: Option<String>,
    /// Locations the activity happens at; at least one.
    pub station: Vec<PermitStation>,
    pub condition: Vec<Condition>,
}

impl Activity {
    fn check(&self, v: &mut Violations) {
        v.not_empty_opt("primary_purpose", self.primary_purpose.as_deref());
        v.ensure(
            !self.station.is_empty(),
            "station",
            Rule::Required,
            "an activity needs at least one station",
        );

        for (index, station) in self.station.iter().enumerate() {
            let mut inner = Violations::new();
            station.check(&mut inner);
            if let Some(properties) = &station.properties {
                let mut props = Violations::new();
                properties.check(&mut props);
                inner.nest("properties", props.into_vec());
            }
            v.nest(&format!("station[{index}]"), inner.into_vec());
        }

        for (index, condition) in self.condition.iter().enumerate() {
            let prefix = format!("condition[{index}]");
            v.not_empty_opt(&format!("{prefix}.text"), condition.text.as_deref());
            for (i, limit) in condition.limit.iter().flatten().enumerate() {
                v.non_negative(&format!("{prefix}.limit[{i}].value"), limit.value);
            }
        }
    }
}

/// A resource consent issued by a permitting authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    pub permit_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_date: Option<NaiveDate>,
    pub commencement_date: NaiveDate,
    pub expiry_date: NaiveDate,
    /// Date the permit actually stopped applying, if earlier or later than
    /// `expiry_date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_end_date: Option<NaiveDate>,
    pub exercised: bool,
    pub permitting_authority: String,
    pub permit_type: PermitType,
    pub activity: Activity,
    #[serde(with = "crate::datetime")]
    pub modified_date: DateTime<Utc>,
}

impl Record for Permit {
    const KIND: &'static str = "permit";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        v.not_empty("permit_id", &self.permit_id);
        v.not_empty("permitting_authority", &self.permitting_authority);
        v.ensure(
            self.commencement_date <= self.expiry_date,
            "expiry_date",
            Rule::ReversedTimeRange,
            format!(
                "{} is before commencement {}",
                self.expiry_date, self.commencement_date
            ),
        );
        if let Some(end) = self.effective_end_date {
            v.ensure(
                end >= self.commencement_date,
                "effective_end_date",
                Rule::ReversedTimeRange,
                format!("{end} is before commencement {}", self.commencement_date),
            );
        }

        let mut activity = Violations::new();
        self.activity.check(&mut activity);
        v.nest("activity", activity.into_vec());
        v.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use chrono::TimeZone;
    use tethys_geometry::Geometry;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn permit() -> Permit {
        let station = PermitStation::with_properties(
            Geometry::point(172.5, -43.5),
            AquiferProp {
                method: Some(SdMethod::Hunt1999),
                stream_depletion_ratio: Some(0.4),
                n_days: Some(150),
                sep_distance: Some(250),
                ..AquiferProp::default()
            },
        )
        .unwrap();

        Permit {
            permit_id: "CRC012345".to_string(),
            status: Status::Active,
            status_changed_date: None,
            commencement_date: date(2015, 7, 1),
            expiry_date: date(2050, 6, 30),
            effective_end_date: None,
            exercised: true,
            permitting_authority: "Environment Canterbury".to_string(),
            permit_type: PermitType::WaterPermit,
            activity: Activity {
                activity_type: ActivityType::ConsumptiveTakeWater,
                feature: Feature::Groundwater,
                primary_purpose: Some("irrigation".to_string()),
                station: vec![station],
                condition: vec![Condition {
                    condition_type: ConditionType::AbstractionLimit,
                    limit: Some(vec![Limit {
                        value: 4320.0,
                        period: Period::Days,
                        units: Units::CubicMeters,
                        limit_boundary: LimitBoundary::Max,
                        aggregation_stat: None,
                    }]),
                    text: None,
                }],
            },
            modified_date: Utc.with_ymd_and_hms(2021, 1, 20, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn enums_use_their_wire_strings() {
        assert_eq!(Period::Days.to_string(), "D");
        assert_eq!(Units::from_str("m3").unwrap(), Units::CubicMeters);
        assert_eq!(
            serde_json::to_string(&ActivityType::NonConsumptiveTakeWater).unwrap(),
            r#""non-consumptive take water""#
        );
        assert_eq!(
            serde_json::from_str::<Status>(r#""Expired - S.124 Protection""#).unwrap(),
            Status::ExpiredS124
        );
        assert_eq!(SdMethod::WardLough2011.as_ref(), "ward_lough_2011");
        assert!(serde_json::from_str::<Feature>(r#""Groundwater""#).is_err());
    }

    #[test]
    fn permit_round_trips() {
        let permit = permit();
        let bytes = permit.to_canonical_bytes().unwrap();
        let json = std::str::from_utf8(&bytes).unwrap();
        assert!(json.contains(r#""commencement_date":"2015-07-01""#), "{json}");
        assert!(json.contains(r#""method":"hunt_1999""#), "{json}");
        assert!(!json.contains("status_changed_date"), "{json}");
        assert_eq!(Permit::from_json(&bytes).unwrap(), permit);
    }

    #[test]
    fn dates_must_be_ordered() {
        let mut permit = permit();
        permit.expiry_date = date(2010, 1, 1);
        permit.effective_end_date = Some(date(2014, 1, 1));
        let error = permit.validated().unwrap_err();
        assert!(error.has("expiry_date", Rule::ReversedTimeRange), "{error}");
        assert!(error.has("effective_end_date", Rule::ReversedTimeRange), "{error}");
    }

    #[test]
    fn activity_rules_are_nested() {
        let mut permit = permit();
        permit.activity.condition[0].limit.as_mut().unwrap()[0].value = -1.0;
        if let Some(props) = permit.activity.station[0].properties.as_mut() {
            props.stream_depletion_ratio = Some(1.5);
            props.stream_width = Some(-3);
        }
        let error = permit.clone().validated().unwrap_err();
        assert!(error.has("activity.condition[0].limit[0].value", Rule::Negative), "{error}");
        assert!(
            error.has("activity.station[0].properties.stream_depletion_ratio", Rule::OutOfRange),
            "{error}"
        );
        assert!(
            error.has("activity.station[0].properties.stream_width", Rule::Negative),
            "{error}"
        );

        permit.activity.station.clear();
        assert!(permit.validated().unwrap_err().has("activity.station", Rule::Required));
    }
}
