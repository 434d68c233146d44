use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::week_start;
use crate::errors::AppError;
use crate::local::storage_key;

pub const MAX_ROTATION_WEEKS: u32 = 52;

pub fn rotation_key(group_id: &str) -> String {
    storage_key("role-rotation", &[group_id])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRole {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationAssignment {
    pub role_id: String,
    pub role_name: String,
    pub member_name: String,
    pub week_start: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRotationConfig {
    pub roles: Vec<RotationRole>,
    pub members: Vec<String>,
    pub rotation_weeks: u32,
    pub first_week: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assignments: Vec<RotationAssignment>,
}

/// Trims each name and drops blanks. Repeated names are rejected.
fn clean_names(values: &[String], what: &str) -> Result<Vec<String>, AppError> {
    let mut names: Vec<String> = Vec::new();
    for name in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if names.iter().any(|seen| seen == name) {
            return Err(AppError::Validation(format!("duplicate {what} '{name}'")));
        }
        names.push(name.to_string());
    }
    if names.is_empty() {
        return Err(AppError::Validation(format!("at least one {what} is required")));
    }
    Ok(names)
}

impl RoleRotationConfig {
    /// Weeks are clamped to 1..=52.
    pub fn new(
        role_names: &[String],
        members: &[String],
        rotation_weeks: u32,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let roles = clean_names(role_names, "role")?;
        let members = clean_names(members, "member")?;

        let mut config = RoleRotationConfig {
            roles: roles
                .into_iter()
                .map(|name| RotationRole {
                    id: Uuid::new_v4().to_string(),
                    name,
                })
                .collect(),
            members,
            rotation_weeks: rotation_weeks.clamp(1, MAX_ROTATION_WEEKS),
            first_week: week_start(today),
            created_at: now,
            assignments: Vec::new(),
        };
        config.assignments = config.generate();
        Ok(config)
    }

    /// Role `r` goes to member `(r + k) mod members` in week `k`.
    pub fn assignments_for_week(&self, week: usize) -> Vec<RotationAssignment> {
        if self.members.is_empty() {
            return Vec::new();
        }
        let start = self.first_week + Duration::weeks(week as i64);
        self.roles
            .iter()
            .enumerate()
            .map(|(r, role)| RotationAssignment {
                role_id: role.id.clone(),
                role_name: role.name.clone(),
                member_name: self.members[(r + week) % self.members.len()].clone(),
                week_start: start,
                completed: false,
            })
            .collect()
    }

    fn generate(&self) -> Vec<RotationAssignment> {
        (0..self.rotation_weeks as usize)
            .flat_map(|week| self.assignments_for_week(week))
            .collect()
    }

    /// Assignments for the week containing `today`.
    pub fn current(&self, today: NaiveDate) -> Vec<&RotationAssignment> {
        let week = week_start(today);
        self.assignments
            .iter()
            .filter(|a| a.week_start == week)
            .collect()
    }

    pub fn mark_completed(&mut self, role_name: &str, week: NaiveDate) -> bool {
        let week = week_start(week);
        match self
            .assignments
            .iter_mut()
            .find(|a| a.role_name == role_name && a.week_start == week)
        {
            Some(assignment) => {
                assignment.completed = !assignment.completed;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn today() -> NaiveDate {
        // a Wednesday
        NaiveDate::from_ymd_opt(2026, 3, 18).unwrap()
    }

    #[test]
    fn roles_rotate_across_members_each_week() {
        let config = RoleRotationConfig::new(
            &names(&["warm-up lead", "music", "cleanup"]),
            &names(&["jin", "mina", "soo"]),
            3,
            today(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(config.assignments.len(), 9);

        let first = config.assignments_for_week(0);
        let second = config.assignments_for_week(1);
        assert_eq!(first[0].member_name, "jin");
        assert_eq!(first[1].member_name, "mina");
        assert_eq!(second[0].member_name, "mina");
        assert_eq!(second[2].member_name, "jin");
        assert_eq!(first[0].week_start, NaiveDate::from_ymd_opt(2026, 3, 16).unwrap());
        assert_eq!(second[0].week_start, NaiveDate::from_ymd_opt(2026, 3, 23).unwrap());
    }

    #[test]
    fn current_week_and_completion_toggle() {
        let mut config = RoleRotationConfig::new(
            &names(&["music"]),
            &names(&["jin", "mina"]),
            2,
            today(),
            Utc::now(),
        )
        .unwrap();
        let current = config.current(today());
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].member_name, "jin");

        assert!(config.mark_completed("music", today()));
        assert!(config.current(today())[0].completed);
        assert!(!config.mark_completed("lights", today()));
    }

    #[test]
    fn empty_roles_or_members_are_rejected() {
        let no_members = RoleRotationConfig::new(&names(&["music"]), &[], 4, today(), Utc::now());
        assert!(matches!(no_members, Err(AppError::Validation(_))));

        let blank_roles =
            RoleRotationConfig::new(&names(&["  ", ""]), &names(&["jin"]), 4, today(), Utc::now());
        assert!(matches!(blank_roles, Err(AppError::Validation(_))));
    }

    #[test]
    fn names_are_trimmed_and_blanks_dropped() {
        let config = RoleRotationConfig::new(
            &names(&[" music ", "  "]),
            &names(&["jin ", "", " mina"]),
            1,
            today(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(config.roles.len(), 1);
        assert_eq!(config.roles[0].name, "music");
        assert_eq!(config.members, names(&["jin", "mina"]));
    }

    #[test]
    fn duplicate_members_are_rejected() {
        let result = RoleRotationConfig::new(
            &names(&["music"]),
            &names(&["jin", " jin"]),
            2,
            today(),
            Utc::now(),
        );
        match result {
            Err(AppError::Validation(message)) => assert!(message.contains("jin")),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn rotation_weeks_are_clamped() {
        let roles = names(&["music"]);
        let members = names(&["jin", "mina"]);

        let longest = RoleRotationConfig::new(&roles, &members, u32::MAX, today(), Utc::now())
            .unwrap();
        assert_eq!(longest.rotation_weeks, MAX_ROTATION_WEEKS);
        assert_eq!(longest.assignments.len(), 52);

        let shortest = RoleRotationConfig::new(&roles, &members, 0, today(), Utc::now()).unwrap();
        assert_eq!(shortest.rotation_weeks, 1);
        assert_eq!(shortest.assignments.len(), 1);
    }
}
