//! Local validation of task-proposal forms.

use super::models::{NewProposal, ProposalForm};
use crate::auth::UserId;
use chrono::NaiveDate;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

/// Longest accepted proposal title
pub const MAX_TITLE_LENGTH: usize = 200;

/// Field-keyed validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        // Keep the first problem per field
        self.fields.entry(field).or_insert_with(|| message.into());
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check a proposal form and build the insert shape
///
/// # Arguments
///
/// * `form` - Raw form input
/// * `author_id` - Submitting user
/// * `today` - Earliest acceptable due date
///
/// # Returns
///
/// * `Result<NewProposal, ValidationErrors>` - Trimmed proposal, or every
///   field problem found
pub fn validate_proposal(
    form: &ProposalForm,
    author_id: UserId,
    today: NaiveDate,
) -> Result<NewProposal, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if form.project_id.is_none() {
        errors.add("project_id", "Please select a project");
    }

    let title = form.title.trim();
    if title.is_empty() {
        errors.add("title", "Title is required");
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add(
            "title",
            format!("Title must be at most {MAX_TITLE_LENGTH} characters"),
        );
    }

    let description = form.description.trim();
    if description.is_empty() {
        errors.add("description", "Description is required");
    }

    match form.estimated_hours {
        None => errors.add("estimated_hours", "Estimated hours are required"),
        Some(hours) if !hours.is_finite() || hours <= 0.0 => {
            errors.add("estimated_hours", "Estimated hours must be greater than zero")
        }
        Some(_) => {}
    }

    if let Some(budget) = form.budget {
        if !budget.is_finite() || budget <= 0.0 {
            errors.add("budget", "Budget must be greater than zero");
        }
    }

    if let Some(due) = form.due_date {
        if due < today {
            errors.add("due_date", "Due date cannot be in the past");
        }
    }

    match (form.project_id, form.estimated_hours) {
        (Some(project_id), Some(estimated_hours)) if errors.is_empty() => Ok(NewProposal {
            project_id,
            author_id,
            title: title.to_string(),
            description: description.to_string(),
            estimated_hours,
            budget: form.budget,
            due_date: form.due_date,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn valid_form() -> ProposalForm {
        ProposalForm {
            project_id: Some(Uuid::new_v4()),
            title: "  Add invoice export  ".to_string(),
            description: "CSV and PDF export for invoices".to_string(),
            estimated_hours: Some(12.5),
            budget: Some(900.0),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
        }
    }

    #[test]
    fn test_valid_form_is_trimmed() {
        let proposal = validate_proposal(&valid_form(), Uuid::new_v4(), today()).unwrap();
        assert_eq!(proposal.title, "Add invoice export");
    }

    #[test]
    fn test_empty_form_reports_every_required_field() {
        let errors =
            validate_proposal(&ProposalForm::default(), Uuid::new_v4(), today()).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.get("project_id").is_some());
        assert!(errors.get("title").is_some());
        assert!(errors.get("description").is_some());
        assert!(errors.get("estimated_hours").is_some());
    }

    #[test]
    fn test_whitespace_title_is_empty() {
        let form = ProposalForm {
            title: "   ".to_string(),
            ..valid_form()
        };
        let errors = validate_proposal(&form, Uuid::new_v4(), today()).unwrap_err();
        assert_eq!(errors.get("title"), Some("Title is required"));
    }

    #[test]
    fn test_non_positive_numbers_rejected() {
        let form = ProposalForm {
            estimated_hours: Some(0.0),
            budget: Some(-5.0),
            ..valid_form()
        };
        let errors = validate_proposal(&form, Uuid::new_v4(), today()).unwrap_err();
        assert!(errors.get("estimated_hours").is_some());
        assert!(errors.get("budget").is_some());

        let nan = ProposalForm {
            estimated_hours: Some(f64::NAN),
            ..valid_form()
        };
        assert!(validate_proposal(&nan, Uuid::new_v4(), today()).is_err());
    }

    #[test]
    fn test_due_date_in_past_rejected_but_today_allowed() {
        let past = ProposalForm {
            due_date: today().pred_opt(),
            ..valid_form()
        };
        assert!(validate_proposal(&past, Uuid::new_v4(), today()).is_err());

        let same_day = ProposalForm {
            due_date: Some(today()),
            ..valid_form()
        };
        assert!(validate_proposal(&same_day, Uuid::new_v4(), today()).is_ok());
    }

    #[test]
    fn test_display_lists_fields() {
        let errors =
            validate_proposal(&ProposalForm::default(), Uuid::new_v4(), today()).unwrap_err();
        let rendered = errors.to_string();
        assert!(rendered.contains("title: Title is required"));
    }
}
