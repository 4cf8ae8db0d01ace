use tokio::task::JoinHandle;
use anyhow::Result;

use crate::chat::{ChatClient, ChatMode};
use crate::voice::{SpeechEngine, VoiceEvent, VoiceSession};
use crate::weather::ResolverStatus;

pub const GREETING: &str =
    "Namaste! Ask me a question or switch to offline mode to see saved answers.";

/// The one user-facing failure string. Raw error detail goes to the log.
pub const APOLOGY: &str = "Sorry, an error occurred. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// One transcript entry. Append-only, never reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

pub struct App {
    pub should_quit: bool,

    // Conversation state
    pub messages: Vec<Message>,
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub offline_mode: bool,

    // At most one dispatch in flight; `Some` is the thinking gate.
    pub chat_task: Option<JoinHandle<Result<String>>>,

    // Active capture session; `Some` is the listening flag.
    pub voice: Option<VoiceSession>,

    // Ambient weather reading, resolved once at startup.
    pub weather: ResolverStatus,

    // Transcript view state (dimensions updated during render)
    pub transcript_scroll: u16,
    pub transcript_height: u16,
    pub transcript_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for the thinking dots

    chat: ChatClient,
    speech: Option<Box<dyn SpeechEngine>>,
}

impl App {
    pub fn new(chat: ChatClient, speech: Option<Box<dyn SpeechEngine>>) -> Self {
        Self {
            should_quit: false,

            messages: vec![Message {
                sender: Sender::Bot,
                text: GREETING.to_string(),
            }],
            input: String::new(),
            input_cursor: 0,
            offline_mode: false,

            chat_task: None,
            voice: None,

            weather: ResolverStatus::Loading,

            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,

            animation_frame: 0,

            chat,
            speech,
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.chat_task.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.voice.is_some()
    }

    pub fn voice_available(&self) -> bool {
        self.speech.is_some()
    }

    /// Submit the typed input. Whitespace-only input and submissions while a
    /// dispatch is in flight do nothing at all.
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() || self.is_thinking() {
            return;
        }

        // The buffer clears right away, before the request settles.
        self.input.clear();
        self.input_cursor = 0;

        self.push_message(Sender::User, text.clone());
        self.begin_dispatch(text);
    }

    /// Flip between the live and the cached-answer endpoint. Only the next
    /// dispatch sees the new value.
    pub fn toggle_mode(&mut self) {
        self.offline_mode = !self.offline_mode;
    }

    /// Mic key. Starts a capture session when idle, signals the active one to
    /// stop otherwise. Rejected outright while a dispatch is in flight.
    pub fn toggle_voice(&mut self) {
        if self.is_thinking() {
            return;
        }
        if let Some(session) = self.voice.as_mut() {
            session.stop();
            return;
        }
        let Some(engine) = &self.speech else {
            return; // no recognition capability configured
        };
        match engine.start() {
            Ok(session) => self.voice = Some(session),
            Err(e) => tracing::error!("could not start voice capture: {e:#}"),
        }
    }

    /// Drain pending capture notifications. Called every tick while a session
    /// is active.
    pub fn poll_voice(&mut self) {
        loop {
            let Some(event) = self.voice.as_mut().and_then(|session| session.try_next()) else {
                break;
            };
            self.on_voice_event(event);
        }
    }

    /// Apply one notification from the capture session.
    pub fn on_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::Transcript(transcript) => {
                if self.is_thinking() {
                    // Keeps dispatches at one in flight even if a transcript
                    // lands while a typed question is pending.
                    tracing::warn!("dropping transcript while a dispatch is in flight");
                    return;
                }
                let text = transcript.trim().to_string();
                if text.is_empty() {
                    return;
                }
                self.push_message(Sender::User, text.clone());
                self.begin_dispatch(text);
            }
            VoiceEvent::Error(reason) => {
                tracing::error!("speech error: {reason}");
            }
            VoiceEvent::End => {
                // The only place the listening state is released.
                self.voice = None;
            }
        }
    }

    /// Settle a finished dispatch, if any. Taking the handle first means input
    /// is re-enabled before the reply lands, whatever the outcome was.
    pub async fn settle_chat(&mut self) {
        if self
            .chat_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            if let Some(task) = self.chat_task.take() {
                let result = task
                    .await
                    .unwrap_or_else(|e| Err(anyhow::anyhow!("request task failed: {e}")));
                self.finish_dispatch(result);
            }
        }
    }

    /// Append the bot entry for a settled dispatch: the reply on success, the
    /// fixed apology on any failure.
    pub fn finish_dispatch(&mut self, result: Result<String>) {
        match result {
            Ok(reply) => self.push_message(Sender::Bot, reply),
            Err(e) => {
                tracing::error!("backend error: {e:#}");
                self.push_message(Sender::Bot, APOLOGY.to_string());
            }
        }
    }

    fn begin_dispatch(&mut self, text: String) {
        let mode = if self.offline_mode {
            ChatMode::Offline
        } else {
            ChatMode::Live
        };
        let chat = self.chat.clone();
        self.chat_task = Some(tokio::spawn(async move { chat.ask(mode, &text).await }));

        // The thinking indicator just appeared below the last entry.
        self.scroll_to_bottom();
    }

    fn push_message(&mut self, sender: Sender, text: String) {
        self.messages.push(Message { sender, text });
        self.scroll_to_bottom();
    }

    /// Tick the thinking dots (called by the Tick event).
    pub fn tick_animation(&mut self) {
        if self.is_thinking() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Total transcript lines at the current wrap width, including the
    /// thinking indicator when shown.
    pub fn transcript_line_total(&self) -> u16 {
        let wrap_width = if self.transcript_width > 0 {
            self.transcript_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in &self.messages {
            total_lines += 1; // sender line ("You:" or "KrishiMitr:")
            for line in msg.text.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after each message
        }

        if self.is_thinking() {
            total_lines += 2; // "KrishiMitr:" + dots
        }

        total_lines
    }

    /// Keep the newest entry visible. Called after every append and every
    /// thinking transition.
    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.transcript_line_total();
        let visible_height = if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        };

        self.transcript_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_up(&mut self) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self
            .transcript_line_total()
            .saturating_sub(self.transcript_height.max(1));
        if self.transcript_scroll < max_scroll {
            self.transcript_scroll += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::sync::{mpsc, oneshot};

    fn test_app() -> App {
        // Port 9 is discard; nothing in these tests awaits the spawned task.
        App::new(ChatClient::new("http://127.0.0.1:9"), None)
    }

    fn scripted_session(events: &[VoiceEvent]) -> VoiceSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, _stop_rx) = oneshot::channel();
        for event in events {
            tx.send(event.clone()).unwrap();
        }
        // Queued events are delivered before the closed channel is noticed.
        VoiceSession::from_channel(rx, stop_tx)
    }

    struct CountingEngine {
        starts: Rc<Cell<usize>>,
    }

    impl SpeechEngine for CountingEngine {
        fn start(&self) -> Result<VoiceSession> {
            self.starts.set(self.starts.get() + 1);
            Ok(scripted_session(&[]))
        }
    }

    #[test]
    fn starts_with_greeting() {
        let app = test_app();
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].sender, Sender::Bot);
        assert_eq!(app.messages[0].text, GREETING);
        assert!(!app.is_thinking());
        assert!(!app.is_listening());
        assert_eq!(app.weather, ResolverStatus::Loading);
    }

    #[tokio::test]
    async fn submit_appends_user_entry_and_clears_buffer() {
        let mut app = test_app();
        app.input = "When to sow wheat?".to_string();
        app.input_cursor = app.input.chars().count();

        app.submit_input();

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].sender, Sender::User);
        assert_eq!(app.messages[1].text, "When to sow wheat?");
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert!(app.is_thinking());
    }

    #[tokio::test]
    async fn whitespace_only_submit_is_a_noop() {
        let mut app = test_app();
        app.input = "   ".to_string();

        app.submit_input();

        assert_eq!(app.messages.len(), 1);
        assert!(!app.is_thinking());
    }

    #[tokio::test]
    async fn submit_while_thinking_is_rejected() {
        let mut app = test_app();
        app.input = "first".to_string();
        app.submit_input();
        assert!(app.is_thinking());

        app.input = "second".to_string();
        app.submit_input();

        // The second question is neither appended nor dispatched; the buffer
        // keeps its text.
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.input, "second");
    }

    #[test]
    fn reply_appends_exactly_one_bot_entry() {
        let mut app = test_app();
        app.finish_dispatch(Ok("Sow after the first monsoon rains.".to_string()));

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].sender, Sender::Bot);
        assert_eq!(app.messages[1].text, "Sow after the first monsoon rains.");
        assert!(!app.is_thinking());
    }

    #[test]
    fn failure_appends_the_fixed_apology() {
        let mut app = test_app();
        app.finish_dispatch(Err(anyhow::anyhow!("connection refused")));

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].sender, Sender::Bot);
        assert_eq!(app.messages[1].text, APOLOGY);
        assert!(!app.is_thinking());
    }

    #[tokio::test]
    async fn settle_clears_thinking_even_when_the_backend_is_down() {
        let mut app = test_app();
        app.input = "ping".to_string();
        app.submit_input();

        let task = app.chat_task.as_ref().unwrap();
        for _ in 0..500 {
            if task.is_finished() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        app.settle_chat().await;
        assert!(!app.is_thinking());
        assert_eq!(app.messages.last().unwrap().text, APOLOGY);
    }

    #[test]
    fn toggle_mode_flips_the_flag() {
        let mut app = test_app();
        assert!(!app.offline_mode);
        app.toggle_mode();
        assert!(app.offline_mode);
        app.toggle_mode();
        assert!(!app.offline_mode);
    }

    #[tokio::test]
    async fn toggling_during_flight_does_not_touch_the_dispatch() {
        let mut app = test_app();
        app.input = "question".to_string();
        app.submit_input();

        app.toggle_mode();
        assert!(app.is_thinking());
        assert!(app.offline_mode);
    }

    #[tokio::test]
    async fn transcript_event_appends_and_dispatches() {
        let mut app = test_app();
        app.voice = Some(scripted_session(&[
            VoiceEvent::Transcript("is it going to rain".to_string()),
            VoiceEvent::End,
        ]));

        app.poll_voice();

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].sender, Sender::User);
        assert_eq!(app.messages[1].text, "is it going to rain");
        assert!(app.is_thinking());
        assert!(!app.is_listening()); // End released the session
    }

    #[tokio::test]
    async fn transcript_while_thinking_is_dropped() {
        let mut app = test_app();
        app.input = "typed question".to_string();
        app.submit_input();

        app.voice = Some(scripted_session(&[
            VoiceEvent::Transcript("spoken question".to_string()),
            VoiceEvent::End,
        ]));
        app.poll_voice();

        // Still only the greeting and the typed question; one dispatch.
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].text, "typed question");
        assert!(!app.is_listening());
    }

    #[test]
    fn voice_error_leaves_the_conversation_unchanged() {
        let mut app = test_app();
        app.voice = Some(scripted_session(&[
            VoiceEvent::Error("no-speech".to_string()),
            VoiceEvent::End,
        ]));

        app.poll_voice();

        assert_eq!(app.messages.len(), 1);
        assert!(!app.is_thinking());
        assert!(!app.is_listening());
    }

    #[test]
    fn end_always_releases_the_session() {
        let mut app = test_app();
        app.voice = Some(scripted_session(&[VoiceEvent::End]));
        app.poll_voice();
        assert!(!app.is_listening());
    }

    #[test]
    fn mic_without_engine_does_nothing() {
        let mut app = test_app();
        app.toggle_voice();
        assert!(!app.is_listening());
    }

    #[test]
    fn mic_starts_one_session_at_a_time() {
        let starts = Rc::new(Cell::new(0));
        let engine = CountingEngine {
            starts: Rc::clone(&starts),
        };
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9"), Some(Box::new(engine)));

        app.toggle_voice();
        assert!(app.is_listening());
        assert_eq!(starts.get(), 1);

        // Second press stops the active session instead of starting another.
        app.toggle_voice();
        assert_eq!(starts.get(), 1);
    }

    #[tokio::test]
    async fn mic_is_rejected_while_thinking() {
        let starts = Rc::new(Cell::new(0));
        let engine = CountingEngine {
            starts: Rc::clone(&starts),
        };
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9"), Some(Box::new(engine)));

        app.input = "question".to_string();
        app.submit_input();
        app.toggle_voice();

        assert!(!app.is_listening());
        assert_eq!(starts.get(), 0);
    }

    #[test]
    fn appends_keep_the_newest_entry_visible() {
        let mut app = test_app();
        app.transcript_width = 20;
        app.transcript_height = 5;

        for i in 0..10 {
            app.finish_dispatch(Ok(format!("reply number {i}")));
        }

        let total = app.transcript_line_total();
        assert_eq!(app.transcript_scroll, total - app.transcript_height);
    }

    #[test]
    fn animation_advances_only_while_thinking() {
        let mut app = test_app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
