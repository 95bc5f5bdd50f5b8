//! The `quizrules init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("quizrules.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("questionnaires")?;
    write_if_missing(
        Path::new("questionnaires/example.json"),
        EXAMPLE_QUESTIONNAIRE,
    )?;

    std::fs::create_dir_all("answers")?;
    write_if_missing(Path::new("answers/example.json"), EXAMPLE_ANSWERS)?;

    println!("\nNext steps:");
    println!("  1. Run: quizrules validate --questionnaire questionnaires/example.json");
    println!(
        "  2. Run: quizrules evaluate --questionnaire questionnaires/example.json --answers answers/example.json"
    );
    println!("  3. Run: quizrules score --questionnaire questionnaires/example.json --answers-dir answers");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizrules configuration

# Evaluation budgets for a single scoring run.
max_depth = 48
max_nodes = 3000

# Concurrent scoring runs for `quizrules score`.
parallelism = 4
output_dir = "./quizrules-results"
"#;

const EXAMPLE_QUESTIONNAIRE: &str = r#"{
  "id": "example",
  "title": "Example personality quiz",
  "questions": [
    { "id": "q1", "text": "I enjoy meeting new people." },
    { "id": "q2", "text": "I prefer quiet evenings at home." },
    { "id": "q3", "text": "I like trying unfamiliar food." },
    { "id": "q4", "text": "I stick to routines." },
    { "id": "l1", "text": "I have never told a lie." }
  ],
  "processing_rules": {
    "version": 1,
    "metrics": [
      {
        "id": "extraversion",
        "title": "Extraversion",
        "expression": {
          "op": "sum_answers",
          "question_ids": ["q1", "q2"],
          "weights": { "q2": -1 }
        }
      },
      {
        "id": "openness",
        "title": "Openness",
        "expression": {
          "op": "sum_answers",
          "question_ids": ["q3", "q4"],
          "weights": { "q4": -1 }
        }
      },
      {
        "id": "balance",
        "title": "Balance",
        "precision": 2,
        "expression": {
          "op": "div",
          "args": [
            { "op": "sum", "args": [
              { "op": "metric", "metric_id": "extraversion" },
              { "op": "metric", "metric_id": "openness" }
            ] },
            { "op": "const", "value": 2 }
          ],
          "on_divide_by_zero": 0
        }
      }
    ],
    "ranking": { "metric_ids": ["extraversion", "openness"], "top_n": 1 },
    "score": {
      "total_expression": {
        "op": "clamp",
        "value": { "op": "sum_answers", "question_ids": ["q1", "q3"] },
        "min_value": 0,
        "max_value": 20
      },
      "max_expression": { "op": "const", "value": 20 },
      "clamp_percentage": true
    },
    "honesty_checks": [
      {
        "id": "lie_scale",
        "title": "Social desirability",
        "severity": "warning",
        "pass_expression": {
          "op": "lt",
          "args": [
            { "op": "answer", "question_id": "l1", "default": 0 },
            { "op": "const", "value": 9 }
          ]
        },
        "value_expression": { "op": "answer", "question_id": "l1", "default": 0 }
      }
    ]
  }
}
"#;

const EXAMPLE_ANSWERS: &str = r#"{
  "q1": { "score": 8 },
  "q2": { "score": 3 },
  "q3": { "score": 9 },
  "q4": { "score": 2 },
  "l1": { "score": 4 }
}
"#;
