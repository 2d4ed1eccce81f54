use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const HISTORY_LIMIT: usize = 20;
pub const CONTEXT_LIMIT: usize = 5;

/// Память чатов на время жизни процесса: последние `HISTORY_LIMIT` строк на чат.
/// На диск не пишется, сами чаты из карты не удаляются.
#[derive(Debug, Default)]
pub struct ChatHistory {
    chats: Mutex<HashMap<i64, VecDeque<String>>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chat_id: i64, line: impl Into<String>) {
        let mut chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entries = chats.entry(chat_id).or_default();
        entries.push_back(line.into());
        while entries.len() > HISTORY_LIMIT {
            entries.pop_front();
        }
    }

    /// Последние `limit` строк чата (от старых к новым).
    pub fn recent(&self, chat_id: i64, limit: usize) -> Vec<String> {
        let chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chats
            .get(&chat_id)
            .map(|entries| {
                let skip = entries.len().saturating_sub(limit);
                entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Контекст для промпта: последние `CONTEXT_LIMIT` строк в виде `Пользователь: <msg>`.
    pub fn context(&self, chat_id: i64) -> String {
        self.recent(chat_id, CONTEXT_LIMIT)
            .iter()
            .map(|m| format!("Пользователь: {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self, chat_id: i64) -> usize {
        let chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chats.get(&chat_id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped_per_chat() {
        let h = ChatHistory::new();
        for i in 0..30 {
            h.push(1, format!("msg {i}"));
        }
        h.push(2, "other chat");
        assert_eq!(h.len(1), HISTORY_LIMIT);
        assert_eq!(h.len(2), 1);
        let all = h.recent(1, 100);
        assert_eq!(all.first().map(String::as_str), Some("msg 10"));
        assert_eq!(all.last().map(String::as_str), Some("msg 29"));
    }

    #[test]
    fn context_uses_last_five() {
        let h = ChatHistory::new();
        for i in 0..7 {
            h.push(9, format!("m{i}"));
        }
        let ctx = h.context(9);
        assert_eq!(ctx.lines().count(), CONTEXT_LIMIT);
        assert!(ctx.starts_with("Пользователь: m2"));
        assert!(ctx.ends_with("Пользователь: m6"));
    }

    #[test]
    fn unknown_chat_is_empty() {
        let h = ChatHistory::new();
        assert_eq!(h.context(404), "");
        assert_eq!(h.len(404), 0);
    }
}
