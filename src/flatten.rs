//! Flattening of the nested conversation graph
//! (conversation → participant → session → segment) into three row-sets.

use crate::apis::models::{Conversation, Session};
use crate::constants::TALK_TIME_METRIC;
use crate::error::Result;
use crate::types::{Cell, RowSet};

pub const CONVERSATION_COLUMNS: [&str; 4] = ["id", "start_time", "end_time", "originating_direction"];

pub const PARTICIPANT_COLUMNS: [&str; 10] = [
    "conversation_id",
    "id",
    "name",
    "purpose",
    "team_id",
    "user_id",
    "session_id",
    "session_ani",
    "session_dnis",
    "talk_time",
];

pub const SEGMENT_COLUMNS: [&str; 5] = ["conversation_id", "type", "start_time", "end_time", "session_id"];

/// The three call-log row-sets, either for one page or for a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct CallLogTables {
    pub conversations: RowSet,
    pub participants: RowSet,
    pub segments: RowSet,
}

impl Default for CallLogTables {
    fn default() -> Self {
        Self {
            conversations: RowSet::new(CONVERSATION_COLUMNS),
            participants: RowSet::new(PARTICIPANT_COLUMNS),
            segments: RowSet::new(SEGMENT_COLUMNS),
        }
    }
}

impl CallLogTables {
    /// Append a flattened page. Conversations are de-duplicated later, in [`finish`](Self::finish).
    pub fn append(&mut self, page: CallLogTables) -> Result<()> {
        self.conversations.extend(page.conversations)?;
        self.participants.extend(page.participants)?;
        self.segments.extend(page.segments)?;
        Ok(())
    }

    /// Drop conversation rows repeated across pages.
    pub fn finish(mut self) -> Self {
        self.conversations.dedup();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty() && self.participants.is_empty() && self.segments.is_empty()
    }
}

/// Flatten one page of conversations.
pub fn flatten_conversations(conversations: &[Conversation]) -> Result<CallLogTables> {
    let mut tables = CallLogTables::default();

    for conversation in conversations {
        let conversation_id = conversation.conversation_id.clone();
        tables.conversations.push(vec![
            conversation_id.clone(),
            conversation.conversation_start.clone(),
            conversation.conversation_end.clone(),
            conversation.originating_direction.clone(),
        ])?;

        for participant in &conversation.participants {
            for session in &participant.sessions {
                tables.participants.push(vec![
                    conversation_id.clone(),
                    participant.participant_id.clone(),
                    participant.participant_name.clone(),
                    participant.purpose.clone(),
                    participant.team_id.clone(),
                    participant.user_id.clone(),
                    session.session_id.clone(),
                    session.ani.clone(),
                    session.dnis.clone(),
                    talk_time(session),
                ])?;

                for segment in session.segments.iter().flatten() {
                    tables.segments.push(vec![
                        conversation_id.clone(),
                        segment.segment_type.clone(),
                        segment.segment_start.clone(),
                        segment.segment_end.clone(),
                        session.session_id.clone(),
                    ])?;
                }
            }
        }
    }

    Ok(tables)
}

/// Value of the first `tTalkComplete` metric of the session, if any.
pub fn talk_time(session: &Session) -> Cell {
    session
        .metrics
        .iter()
        .flatten()
        .find(|m| m.name == TALK_TIME_METRIC)
        .and_then(|m| m.value.as_ref())
        .map(|v| v.to_string())
}
