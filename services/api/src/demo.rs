use crate::infra::{in_memory_service, load_tables, InMemoryObjectStorage};
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use visa_navigator::config::AppConfig;
use visa_navigator::error::AppError;
use visa_navigator::workflows::visa::{
    Application, ApplicationId, ApplicationStatus, DisabledReasoning, NewApplication,
    ProfileUpdate, ServiceSettings, StrengthEngine, StrengthReport, TemplateKind,
    TemplateRequest, TextExtractor, UploadRequest, UserId, UserProfile, UserSync,
    VisaServiceError,
};

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Institution name as entered by the applicant
    #[arg(long)]
    pub(crate) institution: String,
    /// Program of study
    #[arg(long)]
    pub(crate) program: String,
    /// Total cost text; the first number in it is used
    #[arg(long)]
    pub(crate) total_cost: String,
    /// Country of origin
    #[arg(long)]
    pub(crate) country: Option<String>,
    /// Number of documents attached to the application
    #[arg(long, default_value_t = 0)]
    pub(crate) documents: usize,
    /// Treat origin, current country and phone as filled in
    #[arg(long)]
    pub(crate) complete_profile: bool,
    /// Treat the applicant as onboarded
    #[arg(long)]
    pub(crate) onboarded: bool,
    /// JSON file overriding the built-in scoring tables
    #[arg(long)]
    pub(crate) tables: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// Local PDF, image or DOCX file
    pub(crate) file: PathBuf,
    /// Content type; guessed from the file extension when omitted
    #[arg(long)]
    pub(crate) mime: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    #[arg(long, default_value = "University of Waterloo")]
    pub(crate) institution: String,
    #[arg(long, default_value = "Computer Science")]
    pub(crate) program: String,
    #[arg(long, default_value = "$45000")]
    pub(crate) total_cost: String,
    /// Applicant's country of origin
    #[arg(long, default_value = "India")]
    pub(crate) country: String,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let tables = load_tables(args.tables.as_deref())?;
    let engine = StrengthEngine::new(Arc::new(tables));
    let now = Utc::now();
    let applicant = UserId::new("cli");

    let application = Application {
        id: ApplicationId(0),
        user_id: applicant.clone(),
        status: ApplicationStatus::Draft,
        institution: args.institution,
        program: args.program,
        start_date: String::new(),
        total_cost: args.total_cost,
        strength_score: None,
        is_complete: false,
        created_at: now,
        updated_at: now,
    };

    let mut profile = UserProfile::new(applicant, "cli@localhost", now);
    profile.country_of_origin = args.country;
    if args.complete_profile {
        profile.current_country = profile
            .country_of_origin
            .clone()
            .or_else(|| Some("Canada".to_string()));
        profile.phone = Some("on file".to_string());
    }
    profile.is_onboarded = args.onboarded;

    let report = engine.score(&application, &profile, args.documents);
    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Report unavailable: {err}"),
        }
    } else {
        render_strength(&report);
    }
    Ok(())
}

pub(crate) fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let mime = match args.mime {
        Some(mime) => mime,
        None => mime_guess::from_path(&args.file)
            .first_raw()
            .map(str::to_string)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("cannot guess content type of {}", args.file.display()),
                )
            })?,
    };

    let bytes = std::fs::read(&args.file)?;
    let extractor = TextExtractor::new(config.ocr);
    match extractor.try_extract(&bytes, &mime)? {
        Some(text) if text.is_empty() => println!("{} ({mime}): no text found", args.file.display()),
        Some(text) => println!("{text}"),
        None => println!("{}: unsupported content type {mime}", args.file.display()),
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        institution,
        program,
        total_cost,
        country,
    } = args;

    let mut settings = ServiceSettings::default();
    settings.ocr.enabled = false;
    let storage = Arc::new(InMemoryObjectStorage::new("documents"));
    let service = in_memory_service(storage.clone(), Arc::new(DisabledReasoning), settings);
    let applicant = UserId::new("user_demo");

    println!("Visa navigator demo (offline: assistant replies use built-in fallbacks)");

    let synced = service.sync_user(
        &applicant,
        UserSync {
            email: "demo.applicant@example.com".to_string(),
            first_name: Some("Demo".to_string()),
            last_name: Some("Applicant".to_string()),
        },
    );
    let Some(user) = step("Sync user", synced) else {
        return Ok(());
    };
    println!("- Synced {} <{}>", user.display_name(), user.email);

    let updated = service.update_profile(
        &applicant,
        ProfileUpdate {
            country_of_origin: Some(country.clone()),
            current_country: Some(country),
            phone: Some("+1 555 0100".to_string()),
        },
    );
    if step("Update profile", updated).is_none() {
        return Ok(());
    }
    if step("Complete onboarding", service.complete_onboarding(&applicant)).is_none() {
        return Ok(());
    }
    if let Some(status) = step("Onboarding status", service.onboarding_status(&applicant)) {
        println!(
            "- Onboarded: {} | profile complete: {}",
            status.is_onboarded, status.profile_complete
        );
    }

    let created = service.create_application(
        &applicant,
        NewApplication {
            institution,
            program,
            start_date: "September 2025".to_string(),
            total_cost,
            status: ApplicationStatus::Draft,
        },
    );
    let Some(application) = step("Create application", created) else {
        return Ok(());
    };
    println!(
        "- Application {}: {} at {} ({})",
        application.id,
        application.program,
        application.institution,
        application.status.label()
    );

    let upload = UploadRequest {
        doc_type: "Letter of Acceptance".to_string(),
        original_name: "acceptance-letter.png".to_string(),
        mime_type: "image/png".to_string(),
        application_id: Some(application.id),
        bytes: b"\x89PNG\r\n\x1a\ndemo".to_vec(),
    };
    if let Some(document) = step(
        "Upload document",
        service.upload_document(&applicant, upload).await,
    ) {
        println!(
            "- Stored {} as {} ({} bytes)",
            document.doc_type, document.storage_path, document.size
        );
    }

    if let Some(report) = step(
        "Calculate strength",
        service.calculate_strength(&applicant, application.id),
    ) {
        render_strength(&report);
    }

    if let Some(report) = step(
        "Check completeness",
        service.check_completeness(&applicant, application.id).await,
    ) {
        println!(
            "\nChecklist completeness: {}% ({} missing)",
            report.completeness_score,
            report.missing_documents.len()
        );
        for recommendation in report.recommendations.iter().take(3) {
            println!("  - {recommendation}");
        }
    }

    if let Some(analysis) = step(
        "Analyze documents",
        service.analyze_documents(&applicant).await,
    ) {
        println!(
            "\nDocument analysis: completeness {:.0} | quality {:.0}",
            analysis.completeness, analysis.quality
        );
    }

    if let Some(fields) = step("Extract fields", service.extract_fields(&applicant).await) {
        println!("Review fields filled: {} of 11", fields.filled());
    }

    let drafted = service
        .generate_template(
            &applicant,
            TemplateRequest {
                application_id: Some(application.id),
                kind: TemplateKind::Full,
                ..TemplateRequest::default()
            },
        )
        .await;
    if let Some(template) = step("Generate template", drafted) {
        if let Some(statement) = template.statement_of_purpose {
            let opening = statement.lines().next().unwrap_or_default();
            println!("\nStatement of purpose opens with:\n  {opening}");
        }
        if let Some(checklist) = template.document_checklist {
            println!("Checklist items drafted: {}", checklist.len());
        }
    }

    let sweep = service
        .sweep_uncommitted(chrono::Duration::zero())
        .await;
    println!(
        "\nStored objects: {} | stale uploads swept: {}",
        storage.keys().len(),
        sweep.removed.len()
    );

    Ok(())
}

fn step<T>(label: &str, result: Result<T, VisaServiceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            println!("  {label} failed: {err}");
            None
        }
    }
}

fn render_strength(report: &StrengthReport) {
    println!(
        "\nApplication strength: {} / 100 (tables {})",
        report.total_score, report.tables_version
    );
    for component in &report.components {
        println!(
            "  - {:?}: {:.1} x {:.2} ({})",
            component.factor, component.score, component.weight, component.notes
        );
    }
    println!("Recommendations:");
    for recommendation in &report.recommendations {
        println!("  - {recommendation}");
    }
}
