//! Investigation and ophthalmology capture
//!
//! `POST /save_investigation/` takes a multipart form: text fields, the
//! `vitals`/`ophthalmology` JSON objects as text, and report files. Files,
//! the investigation row and the ophthalmology row commit together.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use bytes::Bytes;
use chc_core::models::{parse_json_object, AttachmentKind, Barcode, CompanyId, InvestigationStatus, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::repos::{
    BlobRepo, DbError, Investigation, InvestigationRepo, InvestigationUpsert, NewOphthalmology, Ophthalmology,
    OphthalmologyRepo,
};
use crate::http::error::ApiError;
use crate::http::extractors::ValidBarcode;
use crate::http::server::AppState;

const MAX_EMPLOYEE_ID_LEN: usize = 50;
const MAX_GENDER_LEN: usize = 10;

/// One uploaded report file
#[derive(Debug)]
struct Upload {
    kind: AttachmentKind,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// Multipart form as received
#[derive(Debug, Default)]
struct InvestigationForm {
    fields: HashMap<String, String>,
    uploads: Vec<Upload>,
}

impl InvestigationForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else { continue };
            match AttachmentKind::from_form_field(&name) {
                Some(kind) => {
                    let filename = field.file_name().map(str::to_owned);
                    let content_type = field.content_type().map(str::to_owned);
                    let data = field.bytes().await?;
                    // Browsers send an empty part for an untouched file input
                    if data.is_empty() && filename.as_deref().map_or(true, str::is_empty) {
                        continue;
                    }
                    form.add_upload(Upload {
                        kind,
                        filename,
                        content_type,
                        data,
                    });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// A repeated file field replaces the earlier part of the same kind.
    fn add_upload(&mut self, upload: Upload) {
        match self.uploads.iter_mut().find(|u| u.kind == upload.kind) {
            Some(existing) => *existing = upload,
            None => self.uploads.push(upload),
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.text(key).map(str::to_owned)
    }
}

/// Validated form, files not yet stored
#[derive(Debug)]
struct ValidatedInvestigation {
    record: InvestigationUpsert,
    ophthalmology: Map<String, Value>,
}

fn required<'f>(form: &'f InvestigationForm, field: &'static str, max: usize) -> Result<&'f str, ValidationError> {
    let value = form.text(field).ok_or(ValidationError::Empty { field })?;
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value)
}

impl ValidatedInvestigation {
    fn from_form(form: &InvestigationForm, default_company: &CompanyId) -> Result<Self, ValidationError> {
        let vitals = parse_json_object("vitals", form.fields.get("vitals").map(String::as_str))?;
        let ophthalmology = parse_json_object("ophthalmology", form.fields.get("ophthalmology").map(String::as_str))?;

        let barcode = Barcode::new(form.text("barcode").unwrap_or_default())?;
        let employee_id = required(form, "employee_id", MAX_EMPLOYEE_ID_LEN)?;
        let gender = required(form, "gender", MAX_GENDER_LEN)?;
        let age_text = form.text("age").ok_or(ValidationError::Empty { field: "age" })?;
        let age: i32 = age_text
            .parse()
            .ok()
            .filter(|a| *a >= 0)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "age",
                value: age_text.to_owned(),
            })?;
        let company_id = match form.text("company_id") {
            Some(c) => CompanyId::new(c)?,
            None => default_company.clone(),
        };
        let status = match form.text("status") {
            Some(s) => s.parse()?,
            None => InvestigationStatus::Pending,
        };

        Ok(Self {
            record: InvestigationUpsert {
                barcode: barcode.into_string(),
                employee_id: employee_id.to_owned(),
                company_id: company_id.as_str().to_owned(),
                vitals: Value::Object(vitals),
                gender: gender.to_owned(),
                age,
                status,
                patient_history: form.optional("patient_history"),
                ecg_notes: form.optional("ecg_notes"),
                pft_notes: form.optional("pft_notes"),
                audiometry_notes: form.optional("audiometry_notes"),
                files: Vec::new(),
            },
            ophthalmology,
        })
    }

    /// Ophthalmology row carried inside the form, if one was filled in.
    fn ophthalmology_record(&self) -> Result<Option<NewOphthalmology>, ValidationError> {
        if self.ophthalmology.is_empty() {
            return Ok(None);
        }
        let text = |key: &str| {
            self.ophthalmology
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let status = match text("status") {
            Some(s) => s.parse()?,
            None => self.record.status,
        };
        Ok(Some(NewOphthalmology {
            barcode: self.record.barcode.clone(),
            visual_acuity: self
                .ophthalmology
                .get("visual_acuity")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            remarks: text("remarks"),
            patient_complaints: text("patient_complaints"),
            status,
        }))
    }
}

/// Saved investigation with the ophthalmology row written alongside
#[derive(Debug, Serialize)]
pub struct SavedInvestigation {
    #[serde(flatten)]
    pub investigation: Investigation,
    pub ophthalmology: Option<Ophthalmology>,
}

/// POST /save_investigation/
async fn save_investigation(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SavedInvestigation>), ApiError> {
    let form = InvestigationForm::read(multipart).await?;
    let mut validated = ValidatedInvestigation::from_form(&form, &state.default_company)?;
    let ophthalmology = validated.ophthalmology_record()?;

    let mut tx = state.pool.begin().await.map_err(DbError::from)?;
    for upload in &form.uploads {
        let id = BlobRepo::put(
            &mut tx,
            upload.filename.as_deref(),
            upload.content_type.as_deref(),
            &upload.data,
        )
        .await?;
        validated.record.files.push((upload.kind, id));
    }
    let investigation = InvestigationRepo::upsert(&mut tx, &validated.record).await?;
    let ophthalmology = match &ophthalmology {
        Some(record) => Some(OphthalmologyRepo::upsert(&mut tx, record).await?),
        None => None,
    };
    tx.commit().await.map_err(DbError::from)?;

    tracing::info!(
        barcode = %investigation.barcode,
        files = form.uploads.len(),
        ophthalmology = ophthalmology.is_some(),
        "investigation saved"
    );

    Ok((
        StatusCode::CREATED,
        Json(SavedInvestigation {
            investigation,
            ophthalmology,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct OphthalmologyRequest {
    pub barcode: Option<String>,
    pub visual_acuity: Option<Value>,
    pub remarks: Option<String>,
    pub patient_complaints: Option<String>,
    pub status: Option<String>,
}

impl OphthalmologyRequest {
    fn validate(self) -> Result<NewOphthalmology, ValidationError> {
        let barcode = Barcode::new(self.barcode.as_deref().unwrap_or_default())?;
        let visual_acuity = self
            .visual_acuity
            .filter(|v| !v.is_null())
            .ok_or(ValidationError::Empty { field: "visual_acuity" })?;
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse()?,
            None => InvestigationStatus::Pending,
        };
        Ok(NewOphthalmology {
            barcode: barcode.into_string(),
            visual_acuity,
            remarks: self.remarks.filter(|s| !s.trim().is_empty()),
            patient_complaints: self.patient_complaints.filter(|s| !s.trim().is_empty()),
            status,
        })
    }
}

/// POST /save_ophthalmology/
async fn save_ophthalmology(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OphthalmologyRequest>,
) -> Result<(StatusCode, Json<Ophthalmology>), ApiError> {
    let record = req.validate()?;
    let saved = OphthalmologyRepo::new(&state.pool).save(&record).await?;
    tracing::info!(barcode = %saved.barcode, "ophthalmology saved");
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

/// PATCH /investigations/{barcode}/status
async fn set_status(
    State(state): State<Arc<AppState>>,
    ValidBarcode(barcode): ValidBarcode,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Investigation>, ApiError> {
    let status: InvestigationStatus = req
        .status
        .as_deref()
        .ok_or(ValidationError::Empty { field: "status" })?
        .parse()?;
    let updated = InvestigationRepo::new(&state.pool)
        .set_status(barcode.as_str(), status)
        .await?;
    tracing::info!(barcode = %updated.barcode, status = %status, "investigation status changed");
    Ok(Json(updated))
}

/// Investigation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/save_investigation/", post(save_investigation))
        .route("/save_ophthalmology/", post(save_ophthalmology))
        .route("/investigations/{barcode}/status", patch(set_status))
}
