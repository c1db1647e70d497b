//! Built-in exam profiles and the static family inheritance table.
//!
//! The profiles guarantee the engine is useful without external config; the
//! family table groups sibling exams so they share cached templates.

use crate::domain::{
  CognitiveLevel, Difficulty, ExamConstraints, ExamContext, ExamObjective, ExamProfile,
  QuestionGenerationSettings, QuestionStyle, QuestionType, StylePreferences, TargetDistribution,
  ValidationSettings,
};

/// Exam-id prefix -> family id. First matching prefix wins.
pub const FAMILY_TABLE: &[(&str, &str)] = &[
  ("cfa-", "cfa"),
  ("frm-", "garp"),
  ("aws-", "aws"),
  ("comptia-", "comptia"),
  ("pmp", "pmi"),
  ("capm", "pmi"),
];

fn objective(
  id: &str,
  title: &str,
  weight: f64,
  cognitive_level: CognitiveLevel,
  difficulty: Difficulty,
  key_topics: &[&str],
) -> ExamObjective {
  ExamObjective {
    id: id.into(),
    title: title.into(),
    description: String::new(),
    weight,
    cognitive_level,
    difficulty,
    questions_per_session: 10,
    key_topics: key_topics.iter().map(|t| t.to_string()).collect(),
    style_preferences: None,
  }
}

fn terms(list: &[&str]) -> Vec<String> {
  list.iter().map(|t| t.to_string()).collect()
}

pub fn seed_profiles() -> Vec<ExamProfile> {
  use CognitiveLevel::*;
  use Difficulty::*;

  let mut ethics = objective(
    "ethics",
    "Ethical and Professional Standards",
    20.0,
    Application,
    Intermediate,
    &["Code of Ethics", "Standards of Professional Conduct", "GIPS"],
  );
  // Ethics items are always framed; a bare recall probe tests nothing useful.
  ethics.style_preferences = Some(StylePreferences {
    distribution: Some(TargetDistribution { direct: 0.2, scenario: 0.6, case_study: 0.2 }),
    forbidden: vec![],
  });

  let cfa_1 = ExamProfile {
    id: "cfa-level-1".into(),
    name: "CFA Level I".into(),
    provider: "CFA Institute".into(),
    objectives: vec![
      ethics,
      objective("quant", "Quantitative Methods", 10.0, Knowledge, Beginner,
        &["time value of money", "probability", "hypothesis testing"]),
      objective("fsa", "Financial Statement Analysis", 25.0, Application, Intermediate,
        &["ROE", "ROA", "DuPont analysis", "inventory"]),
      objective("equity", "Equity Investments", 25.0, Application, Intermediate,
        &["CAPM", "beta", "valuation multiples"]),
      objective("portfolio", "Portfolio Management", 20.0, Synthesis, Advanced,
        &["efficient frontier", "alpha", "Sharpe ratio"]),
    ],
    question_types: vec![QuestionType::MultipleChoice],
    constraints: ExamConstraints { question_count: 180, time_limit_minutes: 270, option_count: 3, passing_score: 70.0 },
    context: ExamContext {
      format: "Standalone multiple-choice items with three options".into(),
      difficulty: "intermediate".into(),
      terminology: terms(&["ROE", "ROA", "CAPM", "beta", "alpha", "Sharpe ratio", "WACC", "GIPS", "DuPont"]),
    },
    question_generation: QuestionGenerationSettings::default(),
  };

  let mut ethics_2 = objective(
    "ethics",
    "Ethical and Professional Standards",
    15.0,
    Application,
    Intermediate,
    &["Code of Ethics", "Standards of Professional Conduct", "GIPS"],
  );
  ethics_2.style_preferences = Some(StylePreferences {
    distribution: None,
    forbidden: vec![QuestionStyle::Direct],
  });

  let cfa_2 = ExamProfile {
    id: "cfa-level-2".into(),
    name: "CFA Level II".into(),
    provider: "CFA Institute".into(),
    objectives: vec![
      ethics_2,
      objective("fsa", "Financial Statement Analysis", 30.0, Synthesis, Advanced,
        &["ROE", "ROA", "intercorporate investments", "pensions"]),
      objective("equity", "Equity Valuation", 30.0, Synthesis, Advanced,
        &["free cash flow", "residual income", "WACC"]),
      objective("fixed-income", "Fixed Income", 25.0, Application, Advanced,
        &["duration", "term structure", "credit spreads"]),
    ],
    question_types: vec![QuestionType::MultipleChoice],
    constraints: ExamConstraints { question_count: 88, time_limit_minutes: 264, option_count: 3, passing_score: 70.0 },
    context: ExamContext {
      format: "Item-set vignettes followed by multiple-choice questions".into(),
      difficulty: "advanced".into(),
      terminology: terms(&["ROE", "ROA", "WACC", "free cash flow", "duration", "residual income"]),
    },
    question_generation: QuestionGenerationSettings {
      style_distribution: Some(TargetDistribution { direct: 0.3, scenario: 0.3, case_study: 0.4 }),
      validation: ValidationSettings::default(),
    },
  };

  let aws_saa = ExamProfile {
    id: "aws-solutions-architect-associate".into(),
    name: "AWS Certified Solutions Architect - Associate".into(),
    provider: "Amazon Web Services".into(),
    objectives: vec![
      objective("secure", "Design Secure Architectures", 30.0, Application, Intermediate,
        &["IAM", "KMS", "VPC security groups"]),
      objective("resilient", "Design Resilient Architectures", 26.0, Synthesis, Intermediate,
        &["multi-AZ", "Auto Scaling", "SQS"]),
      objective("performant", "Design High-Performing Architectures", 24.0, Application, Intermediate,
        &["CloudFront", "ElastiCache", "EBS volume types"]),
      objective("cost", "Design Cost-Optimized Architectures", 20.0, Knowledge, Beginner,
        &["Savings Plans", "S3 storage classes", "Spot Instances"]),
    ],
    question_types: vec![QuestionType::MultipleChoice, QuestionType::MultipleSelect],
    constraints: ExamConstraints { question_count: 65, time_limit_minutes: 130, option_count: 4, passing_score: 72.0 },
    context: ExamContext {
      format: "Scenario-heavy multiple-choice and multiple-response".into(),
      difficulty: "intermediate".into(),
      terminology: terms(&["IAM", "VPC", "S3", "EC2", "RDS", "multi-AZ", "Auto Scaling", "CloudFront"]),
    },
    question_generation: QuestionGenerationSettings {
      style_distribution: Some(TargetDistribution { direct: 0.4, scenario: 0.5, case_study: 0.1 }),
      validation: ValidationSettings { min_quality_score: Some(65), ..ValidationSettings::default() },
    },
  };

  vec![cfa_1, cfa_2, aws_saa]
}
