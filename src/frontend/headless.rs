//! 画面を持たないフロントエンド
//!
//! 回答をあらかじめ積んでおき、表示されたメッセージと問い合わせを記録する。
//! バッチ処理やテストで使う。

use super::{Answer, Frontend, Prompt};
use crate::buffer::BufferId;
use crate::error::MessageLevel;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct HeadlessFrontend {
    answers: VecDeque<Answer>,
    default_answer: Answer,
    messages: Vec<(MessageLevel, String)>,
    prompts: Vec<String>,
    refreshes: usize,
    save_points: Vec<BufferId>,
}

impl HeadlessFrontend {
    /// 積まれた回答がなくなったら `default_answer` を返す
    pub fn new(default_answer: Answer) -> Self {
        Self {
            answers: VecDeque::new(),
            default_answer,
            messages: Vec::new(),
            prompts: Vec::new(),
            refreshes: 0,
            save_points: Vec::new(),
        }
    }

    /// 次の問い合わせへの回答を積む
    pub fn push_answer(&mut self, answer: Answer) {
        self.answers.push_back(answer);
    }

    pub fn with_answers<I: IntoIterator<Item = Answer>>(mut self, answers: I) -> Self {
        self.answers.extend(answers);
        self
    }

    pub fn messages(&self) -> &[(MessageLevel, String)] {
        &self.messages
    }

    /// 最後に表示したメッセージ
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|(_, message)| message.as_str())
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    pub fn save_points(&self) -> &[BufferId] {
        &self.save_points
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.prompts.clear();
    }
}

impl Default for HeadlessFrontend {
    fn default() -> Self {
        Self::new(Answer::No)
    }
}

impl Frontend for HeadlessFrontend {
    fn ask(&mut self, prompt: &Prompt<'_>) -> Answer {
        self.prompts.push(prompt.text());
        self.answers.pop_front().unwrap_or(self.default_answer)
    }

    fn report(&mut self, level: MessageLevel, message: &str) {
        log::debug!("status ({:?}): {}", level, message);
        self.messages.push((level, message.to_string()));
    }

    fn refresh_display(&mut self) {
        self.refreshes += 1;
    }

    fn mark_saved(&mut self, buffer: BufferId) {
        self.save_points.push(buffer);
    }
}
