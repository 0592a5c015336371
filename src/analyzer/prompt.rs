//! Prompt synthesis for interview-mode responses
//!
//! Renders a [`ResponseContext`](super::ResponseContext) into the
//! natural-language instruction sent to the model, shaped by the question
//! style and the configured interview type.

use super::{ResponseContext, ResponseStyle};
use crate::mode::InterviewType;

/// Build the response-generation prompt for a detected interview question
pub fn build_interview_prompt(context: &ResponseContext, interview_type: InterviewType) -> String {
    let mut prompt = format!(
        "I'm in an interview setting. The interviewer just asked: \"{}\". ",
        context.question
    );

    let surrounding = context.context.trim();
    if !surrounding.is_empty() && surrounding != context.question {
        prompt.push_str(&format!(
            "Recent conversation context: \"{}\". ",
            surrounding
        ));
    }

    prompt.push_str(match context.style {
        ResponseStyle::Experience => {
            "Please provide a professional response highlighting relevant experience and skills. "
        }
        ResponseStyle::Technical => {
            "Please provide a clear technical explanation with examples if appropriate. "
        }
        ResponseStyle::Example => {
            "Please provide a specific example or case study to illustrate the point. "
        }
        ResponseStyle::Motivation => {
            "Please provide a thoughtful response about motivations and goals. "
        }
        ResponseStyle::General => "Please provide a professional and appropriate response. ",
    });

    match interview_type {
        InterviewType::Technical => {
            prompt.push_str(
                "This is a technical interview, so focus on technical aspects and problem-solving. ",
            );
        }
        InterviewType::Behavioral => {
            prompt.push_str(
                "This is a behavioral interview, so use the STAR method (Situation, Task, Action, Result) if applicable. ",
            );
        }
        InterviewType::Panel => {
            prompt.push_str("This is a panel interview with multiple interviewers. ");
        }
        InterviewType::General => {}
    }

    prompt.push_str("Keep the response concise, professional, and directly address the question asked.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QuestionKind;

    fn context(question: &str, surrounding: &str, style: ResponseStyle) -> ResponseContext {
        ResponseContext {
            question: question.to_string(),
            context: surrounding.to_string(),
            question_kind: QuestionKind::Phrase,
            interviewer_confidence: 0.9,
            style,
        }
    }

    #[test]
    fn test_prompt_quotes_the_question() {
        let prompt = build_interview_prompt(
            &context("What is your greatest strength?", "", ResponseStyle::General),
            InterviewType::General,
        );
        assert!(prompt.contains("\"What is your greatest strength?\""));
        assert!(prompt.ends_with("directly address the question asked."));
    }

    #[test]
    fn test_context_included_only_when_distinct() {
        let same = build_interview_prompt(
            &context("why this role", "why this role", ResponseStyle::Motivation),
            InterviewType::General,
        );
        assert!(!same.contains("Recent conversation context"));

        let distinct = build_interview_prompt(
            &context("why this role", "earlier we discussed pay", ResponseStyle::Motivation),
            InterviewType::General,
        );
        assert!(distinct.contains("Recent conversation context: \"earlier we discussed pay\""));
    }

    #[test]
    fn test_style_shapes_the_directive() {
        let technical = build_interview_prompt(
            &context("how do you scale this", "", ResponseStyle::Technical),
            InterviewType::General,
        );
        assert!(technical.contains("technical explanation"));

        let example = build_interview_prompt(
            &context("give me an example", "", ResponseStyle::Example),
            InterviewType::General,
        );
        assert!(example.contains("specific example or case study"));
    }

    #[test]
    fn test_interview_type_phrasing() {
        let behavioral = build_interview_prompt(
            &context("tell me about a conflict", "", ResponseStyle::Example),
            InterviewType::Behavioral,
        );
        assert!(behavioral.contains("STAR method"));

        let panel = build_interview_prompt(
            &context("introduce yourself", "", ResponseStyle::General),
            InterviewType::Panel,
        );
        assert!(panel.contains("panel interview"));

        let general = build_interview_prompt(
            &context("introduce yourself", "", ResponseStyle::General),
            InterviewType::General,
        );
        assert!(!general.contains("panel interview"));
    }
}
