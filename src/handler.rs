use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => app.scroll_to_bottom(),
        AppEvent::Tick => {
            // Tick work (animation, task polling) runs in the main loop.
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit_input(),

        // Online/offline switch; the in-flight question keeps its endpoint
        KeyCode::Tab => app.toggle_mode(),

        // Mic: start a capture session, or stop the active one
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_voice();
        }

        // Transcript scrolling
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::PageDown => app.scroll_to_bottom(),

        KeyCode::Esc => {
            app.input.clear();
            app.input_cursor = 0;
        }

        // Input editing
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatClient;
    use crossterm::event::KeyEventState;

    fn test_app() -> App {
        App::new(ChatClient::new("http://127.0.0.1:9"), None)
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: crossterm::event::KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
            kind: crossterm::event::KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn typing_edits_the_buffer_at_the_cursor() {
        let mut app = test_app();
        for c in "wheat".chars() {
            handle_event(&mut app, key(KeyCode::Char(c)));
        }
        assert_eq!(app.input, "wheat");
        assert_eq!(app.input_cursor, 5);

        handle_event(&mut app, key(KeyCode::Home));
        handle_event(&mut app, key(KeyCode::Char('x')));
        assert_eq!(app.input, "xwheat");
        assert_eq!(app.input_cursor, 1);

        handle_event(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input, "wheat");
        assert_eq!(app.input_cursor, 0);
    }

    #[test]
    fn multibyte_input_edits_cleanly() {
        let mut app = test_app();
        for c in "गेहूं".chars() {
            handle_event(&mut app, key(KeyCode::Char(c)));
        }
        let char_count = "गेहूं".chars().count();
        assert_eq!(app.input_cursor, char_count);

        handle_event(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input.chars().count(), char_count - 1);
    }

    #[test]
    fn escape_clears_the_buffer() {
        let mut app = test_app();
        app.input = "half-typed".to_string();
        app.input_cursor = 4;

        handle_event(&mut app, key(KeyCode::Esc));
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
    }

    #[test]
    fn tab_flips_the_mode() {
        let mut app = test_app();
        handle_event(&mut app, key(KeyCode::Tab));
        assert!(app.offline_mode);
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = test_app();
        handle_event(&mut app, ctrl('c'));
        assert!(app.should_quit);
    }

    #[test]
    fn ctrl_r_without_engine_is_harmless() {
        let mut app = test_app();
        handle_event(&mut app, ctrl('r'));
        assert!(!app.is_listening());
    }
}
