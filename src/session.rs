use crate::{
    error::Result,
    models::{ChatMessage, ChatTranscript, GenerationRequest, HistoryEntry},
    storage::ImageStore,
};

/// Front-end state for one user: the image on screen, the generation history
/// (newest first) and the chat transcript. The protocol clients stay
/// stateless; a UI owns one of these and passes it to its handlers.
pub struct Session<S: ImageStore> {
    store: S,
    history: Vec<HistoryEntry>,
    current: Option<HistoryEntry>,
    transcript: ChatTranscript,
}

impl<S: ImageStore> Session<S> {
    pub async fn open(store: S) -> Result<Self> {
        let history = store.load_history().await?;
        log::debug!("Session opened with {} history entries", history.len());
        Ok(Self {
            current: history.first().cloned(),
            store,
            history,
            transcript: ChatTranscript::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.current.as_ref()
    }

    pub fn select(&mut self, id: &str) -> Option<&HistoryEntry> {
        self.current = self.history.iter().find(|entry| entry.id == id).cloned();
        self.current.as_ref()
    }

    /// Saves freshly generated image bytes and puts them at the top of the history.
    pub async fn record_image(
        &mut self,
        request: &GenerationRequest,
        bytes: &[u8],
    ) -> Result<HistoryEntry> {
        let handle = self.store.save_image(bytes).await?;
        let entry = HistoryEntry::new(request, handle);

        self.history.insert(0, entry.clone());
        self.store.save_history(&self.history).await?;
        self.current = Some(entry.clone());

        log::info!("Recorded image {} ({} bytes)", entry.id, bytes.len());
        Ok(entry)
    }

    /// Drops an entry and its image. Returns whether anything was removed.
    pub async fn remove_entry(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.history.iter().position(|entry| entry.id == id) else {
            return Ok(false);
        };
        let entry = self.history.remove(index);
        self.store.delete_image(&entry.image_handle).await?;
        self.store.save_history(&self.history).await?;

        if self.current.as_ref().map(|c| c.id.as_str()) == Some(id) {
            self.current = self.history.first().cloned();
        }
        Ok(true)
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    /// Adds the user's message and returns the messages to send for this turn.
    /// The empty assistant reply is seeded after the snapshot is taken.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> Vec<ChatMessage> {
        self.transcript.push_user(user_text);
        let outgoing = self.transcript.messages().to_vec();
        self.transcript.begin_assistant();
        outgoing
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        self.transcript.append_fragment(fragment);
    }

    pub fn reset_chat(&mut self) {
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;
    use crate::storage::MemoryImageStore;

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let mut session = Session::open(MemoryImageStore::new()).await.unwrap();
        let first = session
            .record_image(&GenerationRequest::new("a cat", "m"), b"one")
            .await
            .unwrap();
        let second = session
            .record_image(&GenerationRequest::new("a dog", "m"), b"two")
            .await
            .unwrap();

        let ids: Vec<&str> = session.history().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(session.current().unwrap().prompt, "a dog");
        assert_eq!(session.store().load_history().await.unwrap().len(), 2);
        assert_eq!(
            session.store().load_image(&first.image_handle).await.unwrap(),
            Some(b"one".to_vec())
        );
    }

    #[tokio::test]
    async fn test_remove_entry_deletes_image() {
        let mut session = Session::open(MemoryImageStore::new()).await.unwrap();
        let entry = session
            .record_image(&GenerationRequest::new("a cat", "m"), b"png")
            .await
            .unwrap();

        assert!(session.remove_entry(&entry.id).await.unwrap());
        assert!(!session.remove_entry(&entry.id).await.unwrap());
        assert!(session.history().is_empty());
        assert!(session.current().is_none());
        assert_eq!(session.store().image_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_turn() {
        let mut session = Session::open(MemoryImageStore::new()).await.unwrap();
        let outgoing = session.begin_turn("hi");
        assert_eq!(outgoing, vec![ChatMessage::user("hi")]);

        session.append_fragment("He");
        session.append_fragment("llo");
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Hello");
    }
}
