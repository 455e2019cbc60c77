use super::common::*;

use crate::workflows::visa::assistant::{DocumentAnalysis, TemplateKind};
use crate::workflows::visa::domain::{ApplicationId, ApplicationUpdate, ApplicationStatus, DocumentId};
use crate::workflows::visa::fields::{FieldMap, FieldValue};
use crate::workflows::visa::reasoning::ReasoningError;
use crate::workflows::visa::repository::{ApplicationRepository, DocumentRepository};
use crate::workflows::visa::service::{TemplateRequest, VisaServiceError};
use crate::workflows::visa::upload::{UploadRejected, UploadRequest};

fn pdf_upload(doc_type: &str, application: Option<ApplicationId>) -> UploadRequest {
    UploadRequest {
        doc_type: doc_type.to_string(),
        original_name: "letter.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        application_id: application,
        bytes: b"%PDF-1.4 not really a pdf".to_vec(),
    }
}

#[tokio::test]
async fn strength_end_to_end_persists_score() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    seed_owner(&h.users);
    let application = h
        .service
        .create_application(&owner(), waterloo())
        .expect("application created");

    h.service
        .upload_document(
            &owner(),
            pdf_upload("Letter of Acceptance", Some(application.id)),
        )
        .await
        .expect("upload succeeds");

    let report = h
        .service
        .calculate_strength(&owner(), application.id)
        .expect("scored");
    assert_eq!(report.total_score, 67);

    let stored = h
        .applications
        .fetch(&owner(), application.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.strength_score, Some(67));

    let again = h
        .service
        .calculate_strength(&owner(), application.id)
        .expect("rescored");
    assert_eq!(again, report);
}

#[tokio::test]
async fn strength_for_foreign_application_is_not_found() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    seed_owner(&h.users);
    let application = h
        .service
        .create_application(&owner(), waterloo())
        .expect("created");

    let err = h
        .service
        .calculate_strength(&stranger(), application.id)
        .expect_err("stranger cannot score");
    assert!(matches!(err, VisaServiceError::NotFound("application")));
}

#[tokio::test]
async fn rejected_upload_never_touches_storage() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let mut request = pdf_upload("Passport", None);
    request.mime_type = "text/plain".to_string();

    let err = h
        .service
        .upload_document(&owner(), request)
        .await
        .expect_err("rejected");
    assert!(matches!(
        err,
        VisaServiceError::UploadRejected(UploadRejected::UnsupportedType(_))
    ));

    let mut oversized = pdf_upload("Passport", None);
    oversized.bytes = vec![0u8; (settings().upload_max_bytes + 1) as usize];
    let err = h
        .service
        .upload_document(&owner(), oversized)
        .await
        .expect_err("too large");
    assert!(matches!(
        err,
        VisaServiceError::UploadRejected(UploadRejected::TooLarge { .. })
    ));

    assert!(h.storage.keys().is_empty());
    assert_eq!(h.documents.len(), 0);
}

#[tokio::test]
async fn upload_to_foreign_application_is_refused_before_storage() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let foreign = h
        .applications
        .insert(&stranger(), waterloo())
        .expect("stranger application");

    let err = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", Some(foreign.id)))
        .await
        .expect_err("not owned");
    assert!(matches!(err, VisaServiceError::NotFound("application")));
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn upload_stores_object_under_owner_prefix_and_commits() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let record = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect("uploaded");

    assert!(record.storage_path.starts_with("user_ana/Passport/"));
    assert!(record.storage_path.ends_with(".pdf"));
    assert_eq!(record.filename, record.storage_path);
    assert_eq!(record.original_name, "letter.pdf");
    assert_eq!(h.storage.keys(), vec![record.storage_path.clone()]);
    assert!(!h.service.ledger().is_pending(&record.storage_path));
    // The bytes are not a parseable PDF; extraction degrades to no text.
    assert_eq!(record.text_content, None);
}

#[tokio::test]
async fn failed_metadata_insert_removes_stored_object() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    h.documents.fail_inserts();

    let err = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect_err("insert fails");
    assert!(matches!(err, VisaServiceError::Repository(_)));
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn orphan_left_by_failed_cleanup_is_swept() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    h.documents.fail_inserts();
    h.storage.fail_deletes(true);

    h.service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect_err("insert fails");
    let orphan = h.storage.keys();
    assert_eq!(orphan.len(), 1);
    assert!(h.service.ledger().is_pending(&orphan[0]));

    h.storage.fail_deletes(false);
    let report = h.service.sweep_uncommitted(chrono::Duration::zero()).await;
    assert_eq!(report.removed, orphan);
    assert!(report.failed.is_empty());
    assert!(h.storage.keys().is_empty());
    assert!(!h.service.ledger().is_pending(&orphan[0]));
}

#[tokio::test]
async fn storage_upload_failure_surfaces_and_writes_no_row() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    h.storage.fail_uploads();

    let err = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect_err("storage down");
    assert!(matches!(err, VisaServiceError::Storage(_)));
    assert_eq!(h.documents.len(), 0);
}

#[tokio::test]
async fn delete_tolerates_storage_failure() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let record = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect("uploaded");

    h.storage.fail_deletes(true);
    h.service
        .delete_document(&owner(), record.id)
        .await
        .expect("row removed despite storage failure");
    assert_eq!(h.documents.len(), 0);
    assert!(matches!(
        h.service.get_document(&owner(), record.id),
        Err(VisaServiceError::NotFound("document"))
    ));
}

#[tokio::test]
async fn cross_user_document_access_is_not_found() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let record = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", None))
        .await
        .expect("uploaded");

    assert!(matches!(
        h.service.get_document(&stranger(), record.id),
        Err(VisaServiceError::NotFound("document"))
    ));
    assert!(matches!(
        h.service.document_url(&stranger(), record.id).await,
        Err(VisaServiceError::NotFound("document"))
    ));
    assert!(h.service.list_documents(&stranger(), None).expect("list").is_empty());

    let url = h
        .service
        .document_url(&owner(), record.id)
        .await
        .expect("signed url");
    assert!(url.ends_with("expires_in=3600"));
}

#[tokio::test]
async fn application_crud_is_owner_scoped_and_newest_first() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let first = h.service.create_application(&owner(), waterloo()).expect("first");
    let mut mcgill = waterloo();
    mcgill.institution = "McGill University".to_string();
    let second = h.service.create_application(&owner(), mcgill).expect("second");

    let listed: Vec<ApplicationId> = h
        .service
        .list_applications(&owner())
        .expect("list")
        .into_iter()
        .map(|application| application.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);

    let updated = h
        .service
        .update_application(
            &owner(),
            first.id,
            ApplicationUpdate {
                status: Some(ApplicationStatus::InReview),
                ..ApplicationUpdate::default()
            },
        )
        .expect("updated");
    assert_eq!(updated.status, ApplicationStatus::InReview);
    assert!(updated.updated_at >= first.updated_at);

    assert!(matches!(
        h.service.delete_application(&stranger(), first.id),
        Err(VisaServiceError::NotFound("application"))
    ));
    h.service.delete_application(&owner(), first.id).expect("deleted");
    assert_eq!(h.service.list_applications(&owner()).expect("list").len(), 1);
}

#[tokio::test]
async fn deleting_application_detaches_its_documents() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let kept = h.service.create_application(&owner(), waterloo()).expect("kept");
    let doomed = h.service.create_application(&owner(), waterloo()).expect("doomed");

    let attached = h
        .service
        .upload_document(&owner(), pdf_upload("Passport", Some(doomed.id)))
        .await
        .expect("uploaded");
    let other = h
        .service
        .upload_document(&owner(), pdf_upload("Academic Transcript", Some(kept.id)))
        .await
        .expect("uploaded");

    assert!(matches!(
        h.service.delete_application(&stranger(), doomed.id),
        Err(VisaServiceError::NotFound("application"))
    ));
    let still = h.service.get_document(&owner(), attached.id).expect("present");
    assert_eq!(still.application_id, Some(doomed.id));

    h.service.delete_application(&owner(), doomed.id).expect("deleted");

    let orphan = h.service.get_document(&owner(), attached.id).expect("document kept");
    assert_eq!(orphan.application_id, None);
    assert!(matches!(
        h.service.get_application(&owner(), doomed.id),
        Err(VisaServiceError::NotFound("application"))
    ));
    let untouched = h.service.get_document(&owner(), other.id).expect("present");
    assert_eq!(untouched.application_id, Some(kept.id));
    assert_eq!(
        h.documents.count_for_application(&owner(), doomed.id).expect("count"),
        0
    );
}

#[tokio::test]
async fn onboarding_status_tracks_profile_completion() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let unknown = h.service.onboarding_status(&owner()).expect("status");
    assert!(!unknown.is_onboarded && !unknown.profile_complete);

    seed_owner(&h.users);
    let status = h.service.onboarding_status(&owner()).expect("status");
    assert!(status.is_onboarded);
    assert!(status.profile_complete);
}

#[tokio::test]
async fn extract_fields_uses_corpus_in_creation_order() {
    let reply = r#"{"school": {"value": "University of Waterloo", "confidence": 95},
                    "annualTuition": {"value": 45000, "confidence": 90}}"#;
    let h = harness(ScriptedReasoning::replying(reply));
    h.documents
        .insert(stored_document(&owner(), None, "Letter of Acceptance", Some("Admitted to Waterloo")))
        .expect("first");
    h.documents
        .insert(stored_document(&owner(), None, "Bank Statement", Some("Balance CAD 60,000")))
        .expect("second");

    let fields = h.service.extract_fields(&owner()).await.expect("fields");
    assert_eq!(
        fields.school.value,
        FieldValue::Text("University of Waterloo".to_string())
    );
    assert_eq!(fields.annual_tuition.value, FieldValue::Number(45000.0));
    assert_eq!(fields.city, FieldMap::default().city);

    let prompts = h.reasoning.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Admitted to Waterloo\n\nBalance CAD 60,000"));
}

#[tokio::test]
async fn extract_fields_skips_reasoning_for_empty_corpus() {
    let h = harness(ScriptedReasoning::replying("{}"));
    h.documents
        .insert(stored_document(&owner(), None, "Passport", None))
        .expect("document");

    let fields = h.service.extract_fields(&owner()).await.expect("fields");
    assert_eq!(fields, FieldMap::default());
    assert!(h.reasoning.prompts().is_empty());
}

#[tokio::test]
async fn extract_fields_falls_back_on_reasoning_failure() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Status {
        status: 529,
        body: "overloaded".to_string(),
    }));
    h.documents
        .insert(stored_document(&owner(), None, "Passport", Some("Passport No. X1")))
        .expect("document");

    let fields = h.service.extract_fields(&owner()).await.expect("fields");
    assert_eq!(fields, FieldMap::default());
}

#[tokio::test]
async fn extract_fields_without_documents_is_not_found() {
    let h = harness(ScriptedReasoning::replying("{}"));
    assert!(matches!(
        h.service.extract_fields(&owner()).await,
        Err(VisaServiceError::NotFound("documents"))
    ));
}

#[tokio::test]
async fn document_analysis_falls_back_on_unparseable_reply() {
    let h = harness(ScriptedReasoning::replying("Looks fine to me!"));
    h.documents
        .insert(stored_document(&owner(), None, "Passport", None))
        .expect("document");

    let analysis = h.service.analyze_documents(&owner()).await.expect("analysis");
    assert_eq!(analysis, DocumentAnalysis::fallback());
}

#[tokio::test]
async fn completeness_merges_checklist_with_review() {
    let h = harness(ScriptedReasoning::replying(
        r#"{"incompleteDocuments": ["Passport"]}"#,
    ));
    let application = h.service.create_application(&owner(), waterloo()).expect("app");
    h.documents
        .insert(stored_document(&owner(), Some(application.id), "Passport", None))
        .expect("passport");
    h.documents
        .insert(stored_document(&owner(), None, "Letter of Acceptance", None))
        .expect("unattached document");

    let report = h
        .service
        .check_completeness(&owner(), application.id)
        .await
        .expect("report");
    assert_eq!(report.completeness_score, 10);
    assert_eq!(report.missing_documents.len(), 9);
    assert_eq!(report.missing_documents[0], "Letter of Acceptance (LOA)");
    assert_eq!(report.incomplete_documents, vec!["Passport".to_string()]);
}

#[tokio::test]
async fn completeness_review_failure_leaves_incomplete_empty() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    let application = h.service.create_application(&owner(), waterloo()).expect("app");
    h.documents
        .insert(stored_document(&owner(), Some(application.id), "Passport", None))
        .expect("passport");

    let report = h
        .service
        .check_completeness(&owner(), application.id)
        .await
        .expect("report");
    assert!(report.incomplete_documents.is_empty());
    assert_eq!(report.completeness_score, 10);
}

#[tokio::test]
async fn chat_requires_message_and_reports_timeout() {
    let h = harness(ScriptedReasoning::stalling());
    assert!(matches!(
        h.service.chat(&owner(), "   ").await,
        Err(VisaServiceError::Validation(_))
    ));
    assert!(matches!(
        h.service.chat(&owner(), "How much money do I need?").await,
        Err(VisaServiceError::Reasoning(ReasoningError::Timeout))
    ));
}

#[tokio::test]
async fn template_uses_owned_application_details() {
    let h = harness(ScriptedReasoning::replying("Dear Visa Officer, ..."));
    seed_owner(&h.users);
    let application = h.service.create_application(&owner(), waterloo()).expect("app");

    let template = h
        .service
        .generate_template(
            &owner(),
            TemplateRequest {
                application_id: Some(application.id),
                kind: TemplateKind::StudyPlan,
                program: Some("ignored".to_string()),
                ..TemplateRequest::default()
            },
        )
        .await
        .expect("template");
    assert_eq!(
        template.statement_of_purpose.as_deref(),
        Some("Dear Visa Officer, ...")
    );

    let prompt = &h.reasoning.prompts()[0];
    assert!(prompt.contains("- Program: Computer Science"));
    assert!(prompt.contains("- Institution: University of Waterloo"));
    assert!(prompt.contains("- Country of Origin: India"));
}

#[tokio::test]
async fn template_validates_inputs_and_ownership() {
    let h = harness(ScriptedReasoning::replying("not json"));
    let foreign = h
        .applications
        .insert(&stranger(), waterloo())
        .expect("stranger application");

    assert!(matches!(
        h.service
            .generate_template(
                &owner(),
                TemplateRequest {
                    application_id: Some(foreign.id),
                    ..TemplateRequest::default()
                },
            )
            .await,
        Err(VisaServiceError::NotFound("application"))
    ));

    assert!(matches!(
        h.service
            .generate_template(
                &owner(),
                TemplateRequest {
                    program: Some("Nursing".to_string()),
                    ..TemplateRequest::default()
                },
            )
            .await,
        Err(VisaServiceError::Validation(_))
    ));

    let full = h
        .service
        .generate_template(
            &owner(),
            TemplateRequest {
                program: Some("Nursing".to_string()),
                institution: Some("University of Ottawa".to_string()),
                ..TemplateRequest::default()
            },
        )
        .await
        .expect("fallback template");
    assert!(full
        .statement_of_purpose
        .expect("statement")
        .contains("pursuing Nursing at University of Ottawa"));
}

#[tokio::test]
async fn unknown_document_id_is_not_found() {
    let h = harness(ScriptedReasoning::failing(ReasoningError::Disabled));
    assert!(matches!(
        h.service.delete_document(&owner(), DocumentId(404)).await,
        Err(VisaServiceError::NotFound("document"))
    ));
}
