//! Dataset benchmark: zero-shot generation versus multi-step search.
//!
//! The dataset is JSON Lines, one `{"question": ..., "answer": ...}` object
//! per line, where `answer` is a reference solution whose numeric answer is
//! extracted the same way as for model output. Each record produces one JSON
//! line in the report.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::answer::{extract_answer, is_correct};
use crate::constants::ZERO_SHOT_MAX_NEW_TOKENS;
use crate::error::{DatasetError, GenerateError};
use crate::generator::{GenerationParams, Generator};
use crate::scorer::Scorer;
use crate::solver::{SolveConfig, solve};

/// One benchmark question with its reference solution.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BenchRecord {
    pub question: String,
    pub answer: String,
}

/// Outcome of one method on one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodResult {
    pub answer: Option<f64>,
    pub correct: bool,
    /// Wall-clock seconds
    pub time: f64,
    #[serde(skip)]
    pub trace: String,
}

/// One report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchLine {
    pub question: String,
    pub ground_truth: Option<f64>,
    pub zero_shot: MethodResult,
    pub mcts: MethodResult,
}

/// Accuracy totals for a benchmark run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchSummary {
    pub records: usize,
    pub zero_shot_correct: usize,
    pub mcts_correct: usize,
}

impl BenchSummary {
    pub fn zero_shot_accuracy(&self) -> f64 {
        ratio(self.zero_shot_correct, self.records)
    }

    pub fn mcts_accuracy(&self) -> f64 {
        ratio(self.mcts_correct, self.records)
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 { 0.0 } else { n as f64 / d as f64 }
}

/// Parameters for a benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Only the first `limit` records are used
    pub limit: Option<usize>,
    /// Multi-step search parameters
    pub solve: SolveConfig,
    /// Generation parameters for the zero-shot baseline
    pub zero_shot: GenerationParams,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            limit: None,
            solve: SolveConfig::default(),
            zero_shot: GenerationParams {
                samples: 1,
                max_new_tokens: ZERO_SHOT_MAX_NEW_TOKENS,
                ..Default::default()
            },
        }
    }
}

/// Read a JSON Lines dataset, skipping blank lines.
pub fn load_dataset(path: &Path) -> Result<Vec<BenchRecord>, DatasetError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|source| DatasetError::Record { line: i + 1, source })?;
        records.push(record);
    }
    Ok(records)
}

/// Build the benchmark prompt for a question.
pub fn benchmark_prompt(question: &str) -> String {
    format!(
        "Solve the following math problem step by step without code (just math)\n\
         Math Question: {question}\n\
         Output the final answer inside \\boxed at the end."
    )
}

/// Answer with a single unguided generation.
pub fn run_zero_shot<G>(
    question: &str,
    generator: &G,
    params: &GenerationParams,
    truth: Option<f64>,
) -> Result<MethodResult, GenerateError>
where
    G: Generator + ?Sized,
{
    let start = Instant::now();
    let params = GenerationParams {
        samples: 1,
        ..params.clone()
    };
    let trace = generator
        .generate(&benchmark_prompt(question), &params)?
        .into_iter()
        .next()
        .unwrap_or_default();
    let answer = extract_answer(&trace);
    Ok(MethodResult {
        answer,
        correct: is_correct(answer, truth),
        time: start.elapsed().as_secs_f64(),
        trace,
    })
}

/// Answer with a multi-step search.
pub fn run_mcts<G, S>(
    question: &str,
    generator: &G,
    scorer: &S,
    config: &SolveConfig,
    truth: Option<f64>,
) -> Result<MethodResult, GenerateError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
{
    let outcome = solve(&benchmark_prompt(question), generator, scorer, config)?;
    let answer = extract_answer(&outcome.trace);
    Ok(MethodResult {
        answer,
        correct: is_correct(answer, truth),
        time: outcome.elapsed.as_secs_f64(),
        trace: outcome.trace,
    })
}

/// Run both methods over `records`, writing one JSON line per record to `report`.
pub fn run_benchmark<G, S, W>(
    records: &[BenchRecord],
    generator: &G,
    scorer: &S,
    config: &BenchConfig,
    mut report: W,
) -> Result<BenchSummary, DatasetError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
    W: Write,
{
    let limit = config.limit.unwrap_or(records.len());
    let mut summary = BenchSummary::default();

    for record in records.iter().take(limit) {
        let truth = extract_answer(&record.answer);
        let zero_shot = run_zero_shot(&record.question, generator, &config.zero_shot, truth)?;
        let mcts = run_mcts(&record.question, generator, scorer, &config.solve, truth)?;

        summary.records += 1;
        summary.zero_shot_correct += usize::from(zero_shot.correct);
        summary.mcts_correct += usize::from(mcts.correct);
        info!(
            record = summary.records,
            ground_truth = ?truth,
            zero_shot = ?zero_shot.answer,
            mcts = ?mcts.answer,
            "benchmarked question"
        );

        let line = BenchLine {
            question: record.question.clone(),
            ground_truth: truth,
            zero_shot,
            mcts,
        };
        serde_json::to_writer(&mut report, &line)?;
        report.write_all(b"\n")?;
        report.flush()?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;

    struct ConstScorer(f64);

    impl Scorer for ConstScorer {
        fn score(&self, _context: &str, candidates: &[String]) -> Vec<f64> {
            vec![self.0; candidates.len()]
        }
    }

    #[test]
    fn test_load_dataset_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"question\": \"1+1?\", \"answer\": \"#### 2\"}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{\"question\": \"2+2?\", \"answer\": \"#### 4\"}}").unwrap();

        let records = load_dataset(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].question, "2+2?");
    }

    #[test]
    fn test_load_dataset_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"question\": \"1+1?\", \"answer\": \"#### 2\"}}").unwrap();
        writeln!(file, "not json").unwrap();

        let err = load_dataset(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Record { line: 2, .. }));
    }

    #[test]
    fn test_benchmark_prompt() {
        let prompt = benchmark_prompt("What is 3*3?");
        assert!(prompt.contains("Math Question: What is 3*3?\n"));
        assert!(prompt.ends_with("inside \\boxed at the end."));
    }

    #[test]
    fn test_run_benchmark_writes_report() {
        let records = vec![
            BenchRecord {
                question: "2+2?".into(),
                answer: "#### 4".into(),
            },
            BenchRecord {
                question: "3+3?".into(),
                answer: "#### 6".into(),
            },
        ];
        let generator = ScriptedGenerator::new(["so \\boxed{4}"]);
        let mut config = BenchConfig::default();
        config.zero_shot.temperature = 0.0;
        config.solve.search.iterations = 2;
        config.solve.search.generation.samples = 1;
        config.solve.search.generation.temperature = 0.0;

        let mut out = Vec::new();
        let summary =
            run_benchmark(&records, &generator, &ConstScorer(1.0), &config, &mut out).unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.zero_shot_correct, 1);
        assert_eq!(summary.mcts_correct, 1);
        assert_eq!(summary.mcts_accuracy(), 0.5);

        let report = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = report
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["ground_truth"], 4.0);
        assert_eq!(lines[0]["mcts"]["correct"], true);
        assert_eq!(lines[1]["zero_shot"]["correct"], false);
        assert!(lines[0]["mcts"].get("trace").is_none());
    }

    #[test]
    fn test_limit() {
        let records = vec![
            BenchRecord {
                question: "a".into(),
                answer: "1".into(),
            };
            5
        ];
        let generator = ScriptedGenerator::new(["1"]);
        let mut config = BenchConfig {
            limit: Some(2),
            ..Default::default()
        };
        config.solve.max_steps = 1;
        config.solve.search.iterations = 1;

        let summary =
            run_benchmark(&records, &generator, &ConstScorer(0.5), &config, std::io::sink())
                .unwrap();
        assert_eq!(summary.records, 2);
    }

    #[test]
    fn test_empty_summary_accuracy() {
        assert_eq!(BenchSummary::default().zero_shot_accuracy(), 0.0);
    }
}
