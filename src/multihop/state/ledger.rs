// SPDX-License-Identifier: MIT

//! Insertion-ordered record of answered sub-questions

use serde::{Deserialize, Serialize};

/// Question → answer pairs in the order they were first answered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestions {
    entries: Vec<(String, String)>,
}

impl AnsweredQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answer; re-answering keeps the question's original slot
    pub fn insert(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        let question = question.into();
        let answer = answer.into();
        match self.entries.iter_mut().find(|(q, _)| *q == question) {
            Some(entry) => entry.1 = answer,
            None => self.entries.push((question, answer)),
        }
    }

    pub fn get(&self, question: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(q, _)| q == question)
            .map(|(_, a)| a.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(q, a)| (q.as_str(), a.as_str()))
    }

    /// Copy of the ledger without `question`
    pub fn excluding(&self, question: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(q, _)| q != question)
                .cloned()
                .collect(),
        }
    }

    /// `{prefix}Q: ...\nA: ...` blocks joined by newlines, or `None`
    pub fn render(&self, prefix: &str) -> String {
        if self.entries.is_empty() {
            return "None".to_string();
        }
        self.entries
            .iter()
            .map(|(q, a)| format!("{}Q: {}\nA: {}", prefix, q, a))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reanswer_keeps_position() {
        let mut ledger = AnsweredQuestions::new();
        ledger.insert("q1", "a1");
        ledger.insert("q2", "a2");
        ledger.insert("q1", "better a1");

        let pairs: Vec<_> = ledger.iter().collect();
        assert_eq!(pairs, vec![("q1", "better a1"), ("q2", "a2")]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_render() {
        let mut ledger = AnsweredQuestions::new();
        assert_eq!(ledger.render("- "), "None");

        ledger.insert("Who wrote it?", "Philip K. Dick");
        ledger.insert("Last novel?", "The Transmigration of Timothy Archer");
        assert_eq!(
            ledger.render("- "),
            "- Q: Who wrote it?\nA: Philip K. Dick\n- Q: Last novel?\nA: The Transmigration of Timothy Archer"
        );
        assert!(ledger.render("").starts_with("Q: Who wrote it?"));
    }

    #[test]
    fn test_excluding() {
        let mut ledger = AnsweredQuestions::new();
        ledger.insert("q1", "a1");
        ledger.insert("q2", "a2");

        let rest = ledger.excluding("q2");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.get("q1"), Some("a1"));
        assert_eq!(rest.get("q2"), None);
        assert_eq!(ledger.len(), 2);
    }
}
