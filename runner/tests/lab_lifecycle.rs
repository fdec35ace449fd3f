//! End-to-end session tests driven through the public library API.

use labrunner::core::expr::Limits;
use labrunner::io::config::PlayerConfig;
use labrunner::io::lab_store::parse_lab;
use labrunner::lab::{END, LabDocument};
use labrunner::session::Session;
use serde_json::json;

fn load(value: serde_json::Value) -> LabDocument {
    let loaded = parse_lab(&value.to_string(), &Limits::default()).expect("lab");
    assert!(loaded.lint.is_clean(), "{:?}", loaded.lint.errors);
    loaded.doc
}

fn echo_then_quiz() -> LabDocument {
    load(json!({
        "schema_version": "1",
        "lab": {
            "id": "intro",
            "title": "Intro",
            "steps": [
                {"id": "say", "type": "terminal", "points": 10,
                 "instructions": "Print hi.",
                 "terminal": {"validators": [{"match": {"program": "echo", "subcommand": ["hi"]}, "response": "hi"}]},
                 "transitions": {"on_success": "ask"}},
                {"id": "ask", "type": "quiz", "points": 5,
                 "question_md": "Which?", "choices": [{"id": "a", "label": "A"}, {"id": "b", "label": "B"}],
                 "correct": "a", "transitions": {"on_success": "#end"}}
            ]
        }
    }))
}

#[test]
fn two_step_lab_finishes_with_full_score() {
    let mut session = Session::new(&echo_then_quiz(), "seed-1", PlayerConfig::default());
    let first = session.submit(json!("echo hi")).expect("submit");
    assert_eq!(first.responses, vec!["hi".to_string()]);
    session.submit(json!("a")).expect("submit");
    assert_eq!(session.score(), 15);
    assert_eq!(session.current_step_id(), END);
    assert_eq!(session.max_score(), 15);
}

#[test]
fn resubmission_never_re_awards_points() {
    let mut session = Session::new(&echo_then_quiz(), "seed-1", PlayerConfig::default());
    session.submit(json!("echo hi")).expect("submit");
    for _ in 0..3 {
        session.select("say").expect("select completed step");
        let again = session.submit(json!("echo hi")).expect("submit");
        assert!(again.ok);
    }
    assert_eq!(session.score(), 10);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.completed_steps, vec!["say".to_string()]);
    assert_eq!(snapshot.current_step, "ask");
}

#[test]
fn aws_command_is_matched_with_templated_arguments() {
    let doc = load(json!({"lab": {
        "id": "s3",
        "variables": {"bucket": {"type": "choice", "choices": ["acme"]}},
        "steps": [{
            "id": "create", "type": "terminal", "points": 10,
            "terminal": {"validators": [{
                "match": {
                    "program": "aws",
                    "subcommand": ["s3api", "create-bucket"],
                    "required_flags": ["--bucket", "--region"],
                    "args": {"--bucket": "{{bucket}}", "--region": "us-east-1"}
                },
                "response": "Bucket {{bucket}} created",
                "world_patch": [{"op": "push", "path": "s3.buckets", "value": {"name": "{{bucket}}"}}]
            }]},
            "validators": [{"kind": "exists", "path": "$.s3.buckets[*].name"}],
            "transitions": {"on_success": "#end"}
        }]
    }}));
    let mut session = Session::new(&doc, "any", PlayerConfig::default());

    let wrong = session
        .submit(json!("aws s3api create-bucket --bucket acme --region eu-west-1"))
        .expect("submit");
    assert!(!wrong.ok);
    assert!(wrong.errors.iter().any(|error| error.contains("--region")), "{:?}", wrong.errors);
    assert_eq!(session.world().as_value(), &json!({}));

    let right = session
        .submit(json!("aws s3api create-bucket --bucket acme --region us-east-1"))
        .expect("submit");
    assert!(right.ok, "{:?}", right.errors);
    assert_eq!(right.responses, vec!["Bucket acme created".to_string()]);
    assert_eq!(session.world().get("s3.buckets[0].name"), Some(&json!("acme")));
}

#[test]
fn topology_step_reports_every_violation() {
    let doc = load(json!({"lab": {
        "id": "net",
        "steps": [{
            "id": "design", "type": "architecture", "points": 20,
            "architecture": {
                "palette": [{"id": "router", "type": "router"}, {"id": "switch", "type": "switch"}, {"id": "pc", "type": "pc"}],
                "world_path": "network",
                "expected_world": {
                    "nodes": [{"match": {"type": "router"}, "count": 1}, {"match": "switch"}],
                    "links": [{"from": "router", "to": "switch", "bidirectional": true}],
                    "allow_extra_nodes": false
                }
            },
            "transitions": {"on_success": "#end"}
        }]
    }}));
    let mut session = Session::new(&doc, "seed", PlayerConfig::default());

    let missing = session
        .submit(json!({"nodes": [{"id": "s1", "type": "switch"}, {"id": "p1", "type": "pc", "label": "Laptop"}]}))
        .expect("submit");
    assert_eq!(missing.errors.len(), 3, "{:?}", missing.errors);
    assert!(missing.errors[0].contains("router"));
    assert!(missing.errors.contains(&"Unexpected component: Laptop.".to_string()));

    let passed = session
        .submit(json!({
            "nodes": [{"id": "r1", "type": "router"}, {"id": "s1", "type": "switch"}],
            "links": [{"from": "s1", "to": "r1"}]
        }))
        .expect("submit");
    assert!(passed.ok, "{:?}", passed.errors);
    assert!(session.is_finished());
    assert_eq!(session.score(), 20);
    assert_eq!(
        session.world().get("network.summary.type_pairs[0]"),
        Some(&json!({"from": "switch", "to": "router"}))
    );
}

#[test]
fn sessions_with_the_same_seed_draw_the_same_variables() {
    let doc = load(json!({"lab": {
        "id": "vars",
        "variables": {
            "region": {"type": "choice", "choices": ["us-east-1", "eu-west-1", "ap-south-1"]},
            "size": {"type": "number", "min": 1, "max": 100}
        },
        "steps": [{"id": "q", "type": "quiz", "choices": [{"id": "a"}], "correct": "a"}]
    }}));
    let a = Session::new(&doc, "learner-7", PlayerConfig::default());
    let b = Session::new(&doc, "learner-7", PlayerConfig::default());
    assert_eq!(a.vars(), b.vars());
    assert_eq!(a.vars().len(), 2);
}
