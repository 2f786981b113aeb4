// SPDX-License-Identifier: MIT

//! Prompt templates for the pipeline nodes
//!
//! System prompts may carry `{format_instructions}`; [`crate::multihop::llm::Chat`]
//! fills it in. User-side prompts are assembled by the helpers below.

use crate::multihop::config::date_header;
use crate::multihop::state::AnsweredQuestions;

const ORCHESTRATOR: &str = r#"
You route a closed-book, multi-step reasoning pipeline. You never answer the task yourself.

Workers available:
- Decomposer: writes the next factual sub-question; FactRecall answers it automatically.
- Coder: runs a calculation or data manipulation from an explicit instruction.
- FinalAnswer: writes the answer from the facts gathered so far.
- ProgressAssessment runs in the background and reports stalls to you.

Each turn, read the User Task, the answered sub-questions and the last reply, then pick exactly one:

DECOMPOSE - more facts are needed. Leave instruction_or_question empty.
ASK_CODER - the facts are in hand and a computation is required. Put a complete,
  self-contained instruction (including every number it needs) in instruction_or_question.
FINAL_ANSWER - the answered sub-questions are enough to answer the task.
  instruction_or_question may carry guidance for the writer, or be empty.

When the stall count is rising, change approach: ask a sharper question, compute, or finish.

{format_instructions}
"#;

const PROGRESS: &str = r#"
You judge whether the latest step in a reasoning pipeline moved it closer to solving the user's task.
Count it as progress when the response adds new, relevant information, even if partial.
Repeats, refusals, errors and off-topic answers are not progress.

{format_instructions}
"#;

const FACT_RECALL: &str = r#"
You recall facts. The overarching question being worked on is:
{task}

You will receive one sub-question that helps answer it. Answer that sub-question
with the requested information only, no commentary.

{format_instructions}
"#;

const CODER: &str = "You are Coder. Use only the facts given in the instruction. \
If the instruction calls for a calculation or data manipulation, reply with ONLY a Python \
code block wrapped in ```python ... ``` that prints the final result to standard output. \
Add no explanation unless asked. If the instruction is not a computation, say briefly why \
you cannot perform it.\n";

const DECOMPOSER: &str = r#"
You are the Decomposer of a multi-step reasoning pipeline. Each turn you write exactly one
sub-question whose answer moves the pipeline closer to answering the User Task.

Rules:
1. One question per turn, always. Never claim there is enough information.
2. Prefer one entity and one attribute per question, but ask a broader set-building
   question when that is what unblocks progress.
3. Do not repeat answered questions. If an answer was vague, ask a more specific
   version (add a date, place or unit).
4. Do not infer or guess. If a constraint depends on a fact, ask for the fact.
5. Stay on the User Task.

Example
User Task: What is the population density of the driest capital city in the world?
Already answered: Q: What is the driest capital city in the world? A: Cairo
Output: {"question": "What is the population density of Cairo in people per square kilometre?"}

{format_instructions}
"#;

const FINAL_ANSWER: &str = r#"
You write the final answer to the User Task using only the answered sub-questions and
computed results you are given.

- Answer the User Task directly; do not prefix with "Final Answer:".
- If the facts are sufficient, give the complete answer.
- If something is missing, give the partial answer you can support and say what is missing.
- Never invent facts or add outside knowledge.

{format_instructions}
"#;

pub fn orchestrator_system() -> String {
    format!("{}{}", date_header(), ORCHESTRATOR)
}

pub fn progress_system() -> String {
    format!(
        "You are an objective progress assessor.\n{}{}",
        date_header(),
        PROGRESS
    )
}

pub fn fact_recall_system(task: &str) -> String {
    format!("{}{}", date_header(), FACT_RECALL.replace("{task}", task))
}

pub fn coder_system() -> &'static str {
    CODER
}

pub fn decomposer_system() -> &'static str {
    DECOMPOSER
}

pub fn final_answer_system() -> &'static str {
    FINAL_ANSWER
}

/// Everything the Orchestrator sees when deciding the next step
pub struct OrchestratorContext<'a> {
    pub task: &'a str,
    pub answered: &'a AnsweredQuestions,
    pub last_agent: Option<&'a str>,
    pub last_prompt: &'a str,
    pub last_reply: Option<&'a str>,
    pub coder_activity: Option<String>,
    pub stall_count: u32,
    pub stall_reason: Option<&'a str>,
}

pub fn orchestrator_user(ctx: &OrchestratorContext<'_>) -> String {
    format!(
        "User Task: {task}\n\n\
         ANSWERED SUB-QUESTIONS:\n{answered}\n\n\
         LAST AGENT:\nAgent: {agent}\nPrompt: {prompt}\nReply: {reply}\n\n\
         CODER ACTIVITY:\n{coder}\n\n\
         PROGRESS ASSESSMENT:\nStall Count: {stalls}\nStall Reason: {reason}\n\n\
         Decide the next step following your system instructions.",
        task = ctx.task,
        answered = ctx.answered.render("- "),
        agent = ctx.last_agent.unwrap_or("None"),
        prompt = non_empty_or_none(ctx.last_prompt),
        reply = ctx.last_reply.map(non_empty_or_none).unwrap_or("None"),
        coder = ctx.coder_activity.as_deref().unwrap_or("None"),
        stalls = ctx.stall_count,
        reason = ctx.stall_reason.map(non_empty_or_none).unwrap_or("None"),
    )
}

pub fn progress_user(
    task: &str,
    previous: &AnsweredQuestions,
    latest_question: &str,
    latest_response: &str,
) -> String {
    format!(
        "User Task: {}\n\n\
         Previous Knowledge (Answered Questions):\n{}\n\n\
         Latest Attempt:\nQuestion: {}\nResponse: {}\n\n\
         Did this latest response help us get closer to solving the user's task?",
        task,
        previous.render(""),
        latest_question,
        latest_response
    )
}

pub fn decomposer_user(task: &str, answered: &AnsweredQuestions) -> String {
    let mut prompt = format!("User Task: {}\n", task);
    if !answered.is_empty() {
        prompt.push_str(&format!(
            "\nAlready Answered Questions:\n{}\n",
            answered.render("")
        ));
    }
    prompt.push_str(
        "\nWrite exactly one new factual sub-question that addresses the most critical \
         missing information. Do not repeat an answered question; if an answer was too \
         vague, ask a more specific version of it.\n\
         Reply as JSON: {\"question\": \"...\"}",
    );
    prompt
}

pub fn final_answer_user(
    task: &str,
    answered: &AnsweredQuestions,
    instruction: Option<&str>,
    stalled_after: Option<u32>,
) -> String {
    let mut prompt = format!(
        "User Task: {}\n\nAnswered Questions:\n{}\n",
        task,
        answered.render("")
    );
    if let Some(guidance) = instruction.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nGuidance: {}\n", guidance));
    }
    if let Some(stalls) = stalled_after {
        prompt.push_str(&format!(
            "\nNote: Analysis terminated due to {} consecutive stalls - provide best possible answer with available information.\n",
            stalls
        ));
    }
    prompt
}

fn non_empty_or_none(s: &str) -> &str {
    if s.is_empty() {
        "None"
    } else {
        s
    }
}
