use anchor_quiz::config::{Config, GenerationConfig, ShortfallPolicy};
use anchor_quiz::error::DraftFailure;
use anchor_quiz::infrastructure::{CacheStore, JsonFileCacheStore, MemoryCacheStore};
use anchor_quiz::models::{
    AnchorType, CandidateQuestion, GenerationMode, GenerationStatus, OptionKey, OutputStatus,
    QuestionOptions, QuizOutput, RuleVersion, TranscriptSegment,
};
use anchor_quiz::orchestrator::{generate, App, GenerationService, Served};
use anchor_quiz::services::alignment_rules::{check_alignment, matches_definition_template};
use anchor_quiz::services::anchor_detector::detect;
use anchor_quiz::services::quality_validator::{self, has_arrow_sequence, has_nested_label};
use anchor_quiz::services::{DraftRequest, QuestionDrafter};
use anchor_quiz::utils::fingerprint_source;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROCESS_TEXT: &str = "First, create an account. Then verify your email. Finally, log in.";
const RISK_TEXT: &str = "Storing passwords in plain text is a serious security risk for every user.";

/// 按 (锚点类型, 变体) 返回预设题目的出题器，并记录调用次数
struct ScriptedDrafter {
    script: HashMap<(AnchorType, u32), (&'static str, [&'static str; 4])>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDrafter {
    fn new() -> Self {
        let mut script = HashMap::new();
        script.insert(
            (AnchorType::Process, 0),
            (
                "What is the correct order of steps to create an account, verify your email, and log in?",
                [
                    "Create an account, verify the email, then log in",
                    "Log in, verify the email, then create an account",
                    "Verify the email, log in, then create an account",
                    "Create an account, log in, then verify the email",
                ],
            ),
        );
        script.insert(
            (AnchorType::Process, 1),
            (
                "Which step must happen after you create an account but before you log in?",
                [
                    "Verify the email address",
                    "Delete the old account",
                    "Reset the password first",
                    "Contact the support team",
                ],
            ),
        );
        script.insert(
            (AnchorType::Process, 2),
            (
                "Which step comes first when you create an account and verify your email?",
                [
                    "Create the account itself",
                    "Verify the email address",
                    "Log in to the dashboard",
                    "Reset the account password",
                ],
            ),
        );
        script.insert(
            (AnchorType::Risk, 0),
            (
                "What risk comes from storing passwords in plain text?",
                [
                    "Attackers can read every password",
                    "The database becomes slower",
                    "Users forget their passwords",
                    "Backups take more disk space",
                ],
            ),
        );
        script.insert(
            (AnchorType::Risk, 1),
            (
                "How can a team prevent the risk of exposing passwords stored in plain text?",
                [
                    "Hash passwords before saving them",
                    "Email passwords to each user",
                    "Print the passwords for audits",
                    "Store passwords in a spreadsheet",
                ],
            ),
        );
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 出题器移交给服务后仍可读取的调用计数
    fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl QuestionDrafter for ScriptedDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<CandidateQuestion, DraftFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (stem, [a, b, c, d]) = self
            .script
            .get(&(request.anchor_type, request.variant))
            .copied()
            .ok_or_else(|| DraftFailure::MalformedJson {
                message: "no script".to_string(),
            })?;
        Ok(CandidateQuestion {
            anchor_id: request.anchor_id.clone(),
            anchor_type: request.anchor_type,
            variant: request.variant,
            stem: stem.to_string(),
            options: QuestionOptions::new(a, b, c, d),
            correct_key: OptionKey::A,
        })
    }
}

fn segments() -> Vec<TranscriptSegment> {
    vec![
        TranscriptSegment::new(PROCESS_TEXT, 10.0, 14.0),
        TranscriptSegment::new(RISK_TEXT, 20.0, 30.0),
    ]
}

fn exam_config(target_count: usize) -> GenerationConfig {
    GenerationConfig::new(GenerationMode::ExamGrade, target_count)
}

fn memory_service(drafter: ScriptedDrafter) -> GenerationService<ScriptedDrafter, MemoryCacheStore> {
    GenerationService::new(drafter, MemoryCacheStore::new(), Duration::from_secs(30))
}

#[test]
fn test_example_transcript_yields_one_process_anchor() {
    let anchors = detect(&[TranscriptSegment::new(PROCESS_TEXT, 10.0, 14.0)]);

    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].anchor_type, AnchorType::Process);
    assert!(anchors[0].concept_text.ends_with("log in."));
    assert!(anchors[0].start_seconds >= 10.0 && anchors[0].end_seconds <= 14.0);
}

#[tokio::test]
async fn test_example_variant_zero_and_definition_rejection() {
    let segments = vec![TranscriptSegment::new(PROCESS_TEXT, 10.0, 14.0)];
    let anchor = detect(&segments).remove(0);
    let drafter = ScriptedDrafter::new();

    let candidate = drafter
        .draft(&DraftRequest::new(&anchor, PROCESS_TEXT, 0))
        .await
        .unwrap();
    let stem = candidate.stem.to_lowercase();
    assert!(stem.contains("order") || stem.contains("step"));
    assert!(quality_validator::validate(&candidate, &anchor, PROCESS_TEXT).is_ok());

    let definition = CandidateQuestion {
        stem: "What is an account?".to_string(),
        ..candidate
    };
    assert!(quality_validator::validate(&definition, &anchor, PROCESS_TEXT).is_err());
    assert!(check_alignment(AnchorType::Process, "What is an account?").is_err());
}

#[tokio::test]
async fn test_generation_reaches_target_with_clean_questions() {
    let drafter = ScriptedDrafter::new();
    let outcome = generate(&drafter, &segments(), &exam_config(4)).await.unwrap();

    assert_eq!(outcome.status, GenerationStatus::Success);
    assert_eq!(outcome.questions.len(), 4);
    assert_eq!(drafter.calls(), 4);
    assert_eq!(outcome.summary.total_anchors, 2);
    assert_eq!(outcome.summary.anchor_distribution.get(&AnchorType::Process), Some(&1));
    assert_eq!(outcome.summary.anchor_distribution.get(&AnchorType::Risk), Some(&1));

    for question in &outcome.questions {
        if question.anchor_type == AnchorType::Process {
            assert!(check_alignment(AnchorType::Process, &question.stem).is_ok());
            assert!(!matches_definition_template(&question.stem));
        }
        for (_, option) in question.options.iter() {
            assert!(!has_nested_label(option));
            assert!(!has_arrow_sequence(option));
        }
        assert!(question.context_window.contains(question.timestamp_seconds));
    }
}

#[tokio::test]
async fn test_shortfall_is_reported_as_partial() {
    let drafter = ScriptedDrafter::new();
    let outcome = generate(&drafter, &segments(), &exam_config(6)).await.unwrap();

    assert_eq!(outcome.status, GenerationStatus::Partial);
    assert_eq!(outcome.questions.len(), 4);
    assert_eq!(outcome.summary.abandoned_variants, 0);
}

#[tokio::test]
async fn test_second_pass_uses_extra_variants() {
    let drafter = ScriptedDrafter::new();
    let config = GenerationConfig {
        shortfall_policy: ShortfallPolicy::SecondPass,
        ..exam_config(5)
    };
    let outcome = generate(&drafter, &segments(), &config).await.unwrap();

    assert_eq!(outcome.status, GenerationStatus::Success);
    assert_eq!(outcome.questions.len(), 5);
    assert!(outcome.questions.iter().any(|q| q.variant == 2));
}

#[tokio::test]
async fn test_generation_count_invariant() {
    let drafter = ScriptedDrafter::new();
    let calls = drafter.counter();
    let service = memory_service(drafter);
    let config = exam_config(4);

    let first = service.get_or_generate("fp-1", &segments(), &config).await.unwrap();
    let first = match first {
        Served::Generated { record, persisted } => {
            assert!(persisted);
            record
        }
        other => panic!("首次应当生成: {:?}", other),
    };
    assert_eq!(first.generation_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    for _ in 0..10 {
        let served = service.get_or_generate("fp-1", &segments(), &config).await.unwrap();
        assert!(served.is_cache_hit());
        assert_eq!(served.record().unwrap().generation_count, 1);
    }
    let stored = service.store().peek("fp-1", GenerationMode::ExamGrade).await.unwrap().unwrap();
    assert_eq!(stored.generation_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let forced = service.force_regenerate("fp-1", &segments(), &config).await.unwrap();
    let forced = forced.into_record().unwrap();
    assert_eq!(forced.generation_count, 2);
    assert_eq!(forced.created_at, first.created_at);
    assert!(forced.updated_at >= first.updated_at);
    assert!(forced.verify_evidence());
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_cache_hits_do_not_call_drafter() {
    let drafter = ScriptedDrafter::new();
    let calls = drafter.counter();
    let service = memory_service(drafter);
    let config = exam_config(4);

    service.get_or_generate("fp-2", &segments(), &config).await.unwrap();
    for _ in 0..3 {
        service.get_or_generate("fp-2", &segments(), &config).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let record = service
        .store()
        .get("fp-2", GenerationMode::ExamGrade, service.rule_version())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.generation_count, 1);
    assert_eq!(record.quality_metrics.generation_summary.total_questions, 4);
}

#[tokio::test]
async fn test_cache_coherence_across_rule_versions() {
    let store = MemoryCacheStore::new();
    let v1 = RuleVersion::new(1, 4, 0);
    let v2 = RuleVersion::new(2, 0, 0);

    let service = GenerationService::new(ScriptedDrafter::new(), store, Duration::from_secs(30))
        .with_rule_version(v1);
    let record = service
        .get_or_generate("fp-3", &segments(), &exam_config(2))
        .await
        .unwrap()
        .into_record()
        .unwrap();

    let store = service.store();
    assert_eq!(store.get("fp-3", GenerationMode::ExamGrade, v1).await.unwrap(), Some(record));
    assert!(store.get("fp-3", GenerationMode::ExamGrade, v2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rule_upgrade_regenerates_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileCacheStore::new(dir.path().join("cache"));
    let config = exam_config(4);

    let old = GenerationService::new(ScriptedDrafter::new(), store.clone(), Duration::from_secs(30))
        .with_rule_version(RuleVersion::new(1, 0, 0));
    let first = old.get_or_generate("fp-4", &segments(), &config).await.unwrap();
    assert!(!first.is_cache_hit());

    let upgraded = GenerationService::new(ScriptedDrafter::new(), store, Duration::from_secs(30))
        .with_rule_version(RuleVersion::new(1, 1, 0));
    let served = upgraded.get_or_generate("fp-4", &segments(), &config).await.unwrap();
    assert!(!served.is_cache_hit());

    let record = served.into_record().unwrap();
    assert_eq!(record.validation_rule_version, RuleVersion::new(1, 1, 0));
    assert_eq!(record.generation_count, 2);

    let again = upgraded.get_or_generate("fp-4", &segments(), &config).await.unwrap();
    assert!(again.is_cache_hit());
}

#[tokio::test]
async fn test_file_store_reads_with_fractional_times_stay_cache_hits() {
    let dir = tempfile::tempdir().unwrap();
    let service = GenerationService::new(
        ScriptedDrafter::new(),
        JsonFileCacheStore::new(dir.path()),
        Duration::from_secs(30),
    );
    let segments = vec![
        TranscriptSegment::new(PROCESS_TEXT, 3.0, 10.3),
        TranscriptSegment::new(RISK_TEXT, 11.7, 19.9),
    ];
    let config = exam_config(4);

    let first = service.get_or_generate("fp-frac", &segments, &config).await.unwrap();
    assert!(!first.is_cache_hit());

    for _ in 0..3 {
        let served = service.get_or_generate("fp-frac", &segments, &config).await.unwrap();
        assert!(served.is_cache_hit());
        assert_eq!(served.record().unwrap().generation_count, 1);
    }
}

#[tokio::test]
async fn test_cached_record_for_smaller_target_is_not_reported_as_success() {
    let service = memory_service(ScriptedDrafter::new());

    let small = service
        .get_or_generate("fp-target", &segments(), &exam_config(2))
        .await
        .unwrap();
    assert_eq!(small.record().unwrap().status, GenerationStatus::Success);

    let served = service
        .get_or_generate("fp-target", &segments(), &exam_config(10))
        .await
        .unwrap();
    assert!(!served.is_cache_hit());

    let record = served.into_record().unwrap();
    assert_eq!(record.target_count, 10);
    assert_eq!(record.status, GenerationStatus::Partial);
    assert_eq!(record.questions.len(), 4);

    let output = QuizOutput::from_record(&record, false);
    assert_eq!(output.status, OutputStatus::Partial);

    let again = service
        .get_or_generate("fp-target", &segments(), &exam_config(10))
        .await
        .unwrap();
    assert!(again.is_cache_hit());
}

#[tokio::test]
async fn test_tampered_record_is_regenerated() {
    let service = memory_service(ScriptedDrafter::new());
    let config = exam_config(4);

    service.get_or_generate("fp-5", &segments(), &config).await.unwrap();
    assert!(service.store().tamper("fp-5", GenerationMode::ExamGrade, |record| {
        record.quality_metrics.generation_summary.total_anchors = 42;
    }));

    let served = service.get_or_generate("fp-5", &segments(), &config).await.unwrap();
    assert!(!served.is_cache_hit());
    let record = served.into_record().unwrap();
    assert_eq!(record.quality_metrics.generation_summary.total_anchors, 2);
    assert!(record.verify_evidence());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_generate_once() {
    let service = Arc::new(memory_service(ScriptedDrafter::new()));
    let config = exam_config(4);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            service
                .get_or_generate("fp-6", &segments(), &config)
                .await
                .unwrap()
        }));
    }

    let mut generated = 0;
    for handle in handles {
        let served = handle.await.unwrap();
        if !served.is_cache_hit() {
            generated += 1;
        }
        assert_eq!(served.record().unwrap().generation_count, 1);
    }
    assert_eq!(generated, 1);
}

#[tokio::test]
async fn test_output_contract_hides_answers_by_default() {
    let service = memory_service(ScriptedDrafter::new());
    let record = service
        .get_or_generate("fp-7", &segments(), &exam_config(6))
        .await
        .unwrap()
        .into_record()
        .unwrap();

    let output = QuizOutput::from_record(&record, false);
    assert_eq!(output.status, OutputStatus::Partial);
    assert_eq!(output.count, 4);
    assert_eq!(output.anchor_statistics.total_anchors, 2);

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["status"], "partial");
    assert_eq!(json["mode"], "exam_grade");
    assert!(json["questions"][0].get("correct_answer").is_none());
    assert_eq!(json["questions"][0]["anchor_type"], "PROCESS");
    assert_eq!(json["questions"][0]["timestamp_mmss"].as_str().unwrap().len(), 5);

    let with_answers = serde_json::to_value(QuizOutput::from_record(&record, true)).unwrap();
    assert_eq!(with_answers["questions"][0]["correct_answer"], "A");
}

#[tokio::test]
async fn test_batch_app_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let transcripts = dir.path().join("transcripts");
    std::fs::create_dir_all(&transcripts).unwrap();

    let url = "https://videos.example.com/watch/security-basics";
    let wrapped = serde_json::json!({
        "source_url": url,
        "segments": [
            {"text": PROCESS_TEXT, "start": 10.0, "end": 14.0},
            {"text": RISK_TEXT, "start": 20.0, "end": 30.0}
        ]
    });
    std::fs::write(transcripts.join("a.json"), wrapped.to_string()).unwrap();
    let bare = serde_json::json!([{"text": "Hello everyone and welcome back.", "start": 0.0, "end": 5.0}]);
    std::fs::write(transcripts.join("b.json"), bare.to_string()).unwrap();

    let config = Config {
        transcript_folder: transcripts.display().to_string(),
        output_folder: dir.path().join("out").display().to_string(),
        cache_folder: dir.path().join("cache").display().to_string(),
        output_log_file: dir.path().join("run.log").display().to_string(),
        target_count: 4,
        max_concurrent_transcripts: 2,
        ..Config::default()
    };

    let service = GenerationService::new(
        ScriptedDrafter::new(),
        JsonFileCacheStore::new(&config.cache_folder),
        Duration::from_secs(30),
    );
    let app = App::with_service(config.clone(), service).unwrap();
    let stats = app.run().await.unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let output_path = dir
        .path()
        .join("out")
        .join(format!("{}.json", fingerprint_source(url)));
    let output: QuizOutput =
        serde_json::from_str(&std::fs::read_to_string(output_path).unwrap()).unwrap();
    assert_eq!(output.status, OutputStatus::Success);
    assert_eq!(output.count, 4);
    assert!(output.questions.iter().all(|q| q.correct_answer.is_none()));

    let log = std::fs::read_to_string(&config.output_log_file).unwrap();
    assert!(log.contains("insufficient_anchors"));
}
