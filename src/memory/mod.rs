//! 记忆层：对话消息与笔记索引（无跨会话持久化）

pub mod conversation;
pub mod notes_index;

pub use conversation::{latest_user_content, Message, Role};
pub use notes_index::{chunk_text, ChunkingConfig, InMemoryNotesIndex, NoteChunk, NoteHit, NotesIndex};
