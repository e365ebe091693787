use chrono::{Datelike, NaiveDate};

use crate::models::PatientSummary;

/// Patient search over NHS number and last name, case-insensitive. Matches
/// the patients page search box semantics.
pub fn filter_patients(patients: &[PatientSummary], search: &str) -> Vec<PatientSummary> {
    let term = search.to_ascii_lowercase();
    if term.is_empty() {
        return patients.to_vec();
    }
    patients
        .iter()
        .filter(|p| {
            p.nhs_number.to_ascii_lowercase().contains(&term)
                || p.last_name.to_ascii_lowercase().contains(&term)
        })
        .cloned()
        .collect()
}

/// Whole years between a date of birth and a reference date, not counting
/// the current year until the birthday has passed.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}
