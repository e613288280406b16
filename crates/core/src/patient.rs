//! Patient records and the patient store.
//!
//! Patients are loaded once (from a JSON file or the built-in demonstration set)
//! and are immutable for the lifetime of a workflow run. The store validates
//! record identity at load time: a record without an id is reported as a
//! [`OutreachError::MalformedPatient`], never skipped.

use crate::error::{OutreachError, OutreachResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Body mass index as recorded, either numeric or free text such as `">40"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bmi {
    Value(f64),
    Text(String),
}

impl Bmi {
    /// Best-effort numeric reading. Comparison prefixes (`>`, `<`, `≥`, `≤`) are
    /// dropped, so `">40"` reads as `40.0`.
    pub fn approx(&self) -> Option<f64> {
        match self {
            Bmi::Value(v) => Some(*v),
            Bmi::Text(text) => text
                .trim()
                .trim_start_matches(['>', '<', '≥', '≤', '='])
                .trim()
                .parse()
                .ok(),
        }
    }
}

/// One patient record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub age: Option<u32>,
    /// Free-text clinical notes; the primary classification signal.
    pub supporting_facts: Vec<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bmi: Option<Bmi>,
    pub last_hba1c: Option<f64>,
    pub fasting_glucose: Option<f64>,
    pub medications: Option<Vec<String>>,
    pub family_history: Option<Vec<String>>,
    pub last_colonoscopy: Option<String>,
    pub last_mammography: Option<String>,
    pub screening_status: Option<String>,
    pub medication_adherence: Option<String>,
    pub current_weight_trend: Option<String>,
    pub exercise_compliance: Option<String>,
    pub blood_pressure: Option<String>,
    pub last_visit: Option<String>,
}

impl Patient {
    /// Minimal record with only identity and supporting facts set.
    pub fn new(id: i64, name: impl Into<String>, supporting_facts: Vec<String>) -> Self {
        Self {
            id,
            name: name.into(),
            age: None,
            supporting_facts,
            phone: None,
            email: None,
            bmi: None,
            last_hba1c: None,
            fasting_glucose: None,
            medications: None,
            family_history: None,
            last_colonoscopy: None,
            last_mammography: None,
            screening_status: None,
            medication_adherence: None,
            current_weight_trend: None,
            exercise_compliance: None,
            blood_pressure: None,
            last_visit: None,
        }
    }

    /// True if `term` is a case-insensitive substring of any supporting fact.
    pub fn mentions(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.supporting_facts
            .iter()
            .any(|fact| fact.to_lowercase().contains(&term))
    }

    pub fn contact_info(&self) -> ContactInfo {
        ContactInfo {
            patient_id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
        }
    }
}

/// Contact channels used when sending a reminder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactInfo {
    pub patient_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Wire shape of a patient in a JSON patient file. Identity fields are optional
/// here so that missing ones can be reported with the record's position.
#[derive(Deserialize)]
struct PatientRecord {
    #[serde(default, alias = "patient_id")]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    supporting_facts: Vec<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    bmi: Option<Bmi>,
    #[serde(default)]
    last_hba1c: Option<f64>,
    #[serde(default)]
    fasting_glucose: Option<f64>,
    #[serde(default)]
    medications: Option<Vec<String>>,
    #[serde(default)]
    family_history: Option<Vec<String>>,
    #[serde(default)]
    last_colonoscopy: Option<String>,
    #[serde(default)]
    last_mammography: Option<String>,
    #[serde(default)]
    screening_status: Option<String>,
    #[serde(default)]
    medication_adherence: Option<String>,
    #[serde(default)]
    current_weight_trend: Option<String>,
    #[serde(default)]
    exercise_compliance: Option<String>,
    #[serde(default)]
    blood_pressure: Option<String>,
    #[serde(default)]
    last_visit: Option<String>,
}

impl PatientRecord {
    fn into_patient(self, index: usize) -> OutreachResult<Patient> {
        let id = self.id.ok_or_else(|| OutreachError::MalformedPatient {
            index,
            reason: "missing required field `id`".into(),
        })?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| OutreachError::MalformedPatient {
                index,
                reason: format!("patient {id} is missing required field `name`"),
            })?;

        Ok(Patient {
            id,
            name,
            age: self.age,
            supporting_facts: self.supporting_facts,
            phone: self.phone,
            email: self.email,
            bmi: self.bmi,
            last_hba1c: self.last_hba1c,
            fasting_glucose: self.fasting_glucose,
            medications: self.medications,
            family_history: self.family_history,
            last_colonoscopy: self.last_colonoscopy,
            last_mammography: self.last_mammography,
            screening_status: self.screening_status,
            medication_adherence: self.medication_adherence,
            current_weight_trend: self.current_weight_trend,
            exercise_compliance: self.exercise_compliance,
            blood_pressure: self.blood_pressure,
            last_visit: self.last_visit,
        })
    }
}

/// Read-only, ordered set of patients.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientStore {
    patients: Vec<Patient>,
}

impl PatientStore {
    /// Builds a store, rejecting duplicate patient ids.
    pub fn new(patients: Vec<Patient>) -> OutreachResult<Self> {
        for (i, patient) in patients.iter().enumerate() {
            if patients[..i].iter().any(|p| p.id == patient.id) {
                return Err(OutreachError::DuplicatePatientId(patient.id));
            }
        }
        Ok(Self { patients })
    }

    /// Parses a JSON array of patient records.
    ///
    /// Type errors are reported with the JSON path of the offending value
    /// (for example `[2].age`).
    pub fn from_json_str(input: &str) -> OutreachResult<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(input)
            .map_err(|e| OutreachError::PatientDataParse(e.to_string()))?;

        let mut patients = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            let record: PatientRecord = serde_path_to_error::deserialize(value).map_err(|e| {
                let path = e.path().to_string();
                let location = if path == "." {
                    format!("[{index}]")
                } else {
                    format!("[{index}].{path}")
                };
                OutreachError::PatientDataParse(format!("{location}: {}", e.inner()))
            })?;
            patients.push(record.into_patient(index)?);
        }

        Self::new(patients)
    }

    pub fn load(path: &Path) -> OutreachResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(OutreachError::FileRead)?;
        let store = Self::from_json_str(&contents)?;
        tracing::info!("loaded {} patients from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn list(&self) -> &[Patient] {
        &self.patients
    }

    pub fn get(&self, id: i64) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    /// Patients whose supporting facts mention any of the terms. Blank terms are
    /// ignored; each patient appears at most once, in store order.
    pub fn search(&self, terms: &[String]) -> Vec<&Patient> {
        let terms: Vec<&str> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        self.patients
            .iter()
            .filter(|p| terms.iter().any(|term| p.mentions(term)))
            .collect()
    }

    /// Patients within an inclusive age range. Patients without an age are skipped.
    pub fn by_age_range(&self, min_age: Option<u32>, max_age: Option<u32>) -> Vec<&Patient> {
        self.patients
            .iter()
            .filter(|p| match p.age {
                None => {
                    tracing::debug!("skipping patient {} with no age", p.id);
                    false
                }
                Some(age) => {
                    min_age.map_or(true, |min| age >= min) && max_age.map_or(true, |max| age <= max)
                }
            })
            .collect()
    }

    pub fn contact_info(&self, id: i64) -> Option<ContactInfo> {
        self.get(id).map(Patient::contact_info)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Demonstration patient set used when no patient file is configured.
    pub fn demo() -> Self {
        fn facts(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        let mut maria = Patient::new(
            1,
            "Maria Gonzalez",
            facts(&["Type 2 diabetes", "Hypertension", "Missed last two refills"]),
        );
        maria.age = Some(58);
        maria.phone = Some("555-0101".into());
        maria.email = Some("maria.gonzalez@example.com".into());
        maria.last_hba1c = Some(7.8);
        maria.fasting_glucose = Some(142.0);
        maria.medications = Some(facts(&["Metformin", "Lisinopril"]));
        maria.medication_adherence = Some("poor".into());
        maria.blood_pressure = Some("148/92".into());
        maria.last_visit = Some("2024-02-11".into());

        let mut james = Patient::new(
            2,
            "James Carter",
            facts(&["Obesity", "BMI 38", "Sleep apnea"]),
        );
        james.age = Some(45);
        james.phone = Some("555-0102".into());
        james.bmi = Some(Bmi::Value(38.2));
        james.current_weight_trend = Some("increasing".into());
        james.exercise_compliance = Some("low".into());

        let mut linda = Patient::new(
            3,
            "Linda Park",
            facts(&["Overdue for colonoscopy", "Age 52"]),
        );
        linda.age = Some(52);
        linda.email = Some("linda.park@example.com".into());
        linda.screening_status = Some("overdue".into());
        linda.last_colonoscopy = Some("2012-05-03".into());

        let mut robert = Patient::new(4, "Robert Nguyen", facts(&["Seasonal allergies"]));
        robert.age = Some(34);
        robert.phone = Some("555-0104".into());

        let mut aisha = Patient::new(5, "Aisha Khan", facts(&["Type 2 diabetes", "HbA1c 8.2%"]));
        aisha.age = Some(61);
        aisha.phone = Some("555-0105".into());
        aisha.email = Some("aisha.khan@example.com".into());
        aisha.last_hba1c = Some(8.2);
        aisha.fasting_glucose = Some(128.0);
        aisha.medications = Some(facts(&["Metformin"]));

        let mut tom = Patient::new(
            6,
            "Tom Becker",
            facts(&["Morbid obesity", "Metabolic syndrome", "Prediabetic, elevated glucose"]),
        );
        tom.age = Some(50);
        tom.email = Some("tom.becker@example.com".into());
        tom.bmi = Some(Bmi::Text(">40".into()));
        tom.fasting_glucose = Some(118.0);

        let mut grace = Patient::new(7, "Grace Liu", facts(&["family history of colon cancer"]));
        grace.age = Some(47);
        grace.phone = Some("555-0107".into());
        grace.family_history = Some(facts(&["colon cancer"]));

        let mut samuel = Patient::new(8, "Samuel Osei", Vec::new());
        samuel.age = Some(29);

        Self {
            patients: vec![maria, james, linda, robert, aisha, tom, grace, samuel],
        }
    }
}
