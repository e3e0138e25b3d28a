//! Dashboard aggregates over employees and investigations

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{AgeGroup, Vitals};

/// Health band from BMI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    Normal,
    Risk,
    HighRisk,
}

impl HealthBand {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Risk
        } else {
            Self::HighRisk
        }
    }
}

/// The employee fields the dashboard groups by
#[derive(Debug, Clone, Default)]
pub struct EmployeeProfile {
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub normal: u64,
    pub risk: u64,
    pub high_risk: u64,
}

impl HealthStatus {
    fn add(&mut self, band: HealthBand) {
        match band {
            HealthBand::Normal => self.normal += 1,
            HealthBand::Risk => self.risk += 1,
            HealthBand::HighRisk => self.high_risk += 1,
        }
    }
}

/// Response body of `GET /dashboard/analytics/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardAnalytics {
    pub total_employees: u64,
    pub total_assessments: u64,
    pub by_gender: BTreeMap<String, u64>,
    pub by_department: BTreeMap<String, u64>,
    pub by_age_group: BTreeMap<String, u64>,
    pub health_status: HealthStatus,
}

const UNKNOWN: &str = "Unknown";

fn label(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_owned()
}

impl DashboardAnalytics {
    /// Investigations without a usable height and weight count as
    /// assessments but fall in no health band.
    pub fn compute(employees: &[EmployeeProfile], vitals: &[Vitals]) -> Self {
        let mut out = Self {
            total_employees: employees.len() as u64,
            total_assessments: vitals.len() as u64,
            ..Self::default()
        };

        for emp in employees {
            *out.by_gender.entry(label(emp.gender.as_deref())).or_default() += 1;
            *out.by_department.entry(label(emp.department.as_deref())).or_default() += 1;
            let group = emp
                .age
                .map(|a| AgeGroup::from_age(a).label().to_owned())
                .unwrap_or_else(|| UNKNOWN.to_owned());
            *out.by_age_group.entry(group).or_default() += 1;
        }

        for v in vitals {
            if let Some(bmi) = v.bmi() {
                out.health_status.add(HealthBand::from_bmi(bmi));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emp(gender: &str, age: i32, dept: Option<&str>) -> EmployeeProfile {
        EmployeeProfile {
            gender: Some(gender.into()),
            age: Some(age),
            department: dept.map(Into::into),
        }
    }

    #[test]
    fn bands() {
        assert_eq!(HealthBand::from_bmi(22.0), HealthBand::Normal);
        assert_eq!(HealthBand::from_bmi(25.0), HealthBand::Risk);
        assert_eq!(HealthBand::from_bmi(30.0), HealthBand::HighRisk);
    }

    #[test]
    fn groups_employees_and_vitals() {
        let employees = vec![
            emp("Male", 28, Some("Finance")),
            emp("Female", 45, Some(" ")),
            emp("Male", 61, None),
        ];
        let vitals = vec![
            Vitals::from_value(&json!({"height_cm": 170, "weight_kg": 60})),
            Vitals::from_value(&json!({"height_cm": "160", "weight_kg": "70"})),
            Vitals::from_value(&json!({"height_cm": 150, "weight_kg": 90})),
            Vitals::from_value(&json!({})),
        ];

        let a = DashboardAnalytics::compute(&employees, &vitals);
        assert_eq!(a.total_employees, 3);
        assert_eq!(a.total_assessments, 4);
        assert_eq!(a.by_gender["Male"], 2);
        assert_eq!(a.by_department["Unknown"], 2);
        assert_eq!(a.by_age_group["60+"], 1);
        assert_eq!(
            a.health_status,
            HealthStatus { normal: 1, risk: 1, high_risk: 1 }
        );
    }

    #[test]
    fn serializes_expected_keys() {
        let v = serde_json::to_value(DashboardAnalytics::default()).unwrap();
        for key in ["total_employees", "total_assessments", "by_gender", "by_department", "by_age_group", "health_status"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["health_status"]["high_risk"], 0);
    }
}
