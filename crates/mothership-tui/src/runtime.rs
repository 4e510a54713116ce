//! Terminal session and the interactive loop.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event as TerminalEvent};
use crossterm::style::{Attribute, Color, Print, SetAttribute, SetForegroundColor};
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use crossterm::{execute, queue};

use crate::app::{App, WINDOW_TITLE};
use crate::keymap::command_for_key;
use crate::render::{body_rows, render_app, Frame, TextRole};

/// How long the loop waits for input before checking the refresh queue.
pub const UI_TICK: Duration = Duration::from_millis(100);

/// Raw mode plus alternate screen, restored on drop.
pub struct TerminalSession {
    stdout: io::Stdout,
}

impl TerminalSession {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            SetTitle(WINDOW_TITLE),
            Hide,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        Ok(Self { stdout })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = execute!(
            self.stdout,
            SetAttribute(Attribute::Reset),
            LeaveAlternateScreen,
            Show,
            MoveTo(0, 0)
        );
        let _ = terminal::disable_raw_mode();
    }
}

/// Run the notebook until the user quits or the last tab closes.
pub fn run(app: &mut App, tick: Duration) -> io::Result<()> {
    let mut session = TerminalSession::enter()?;
    let (mut width, mut height) = terminal_size()?;
    app.set_viewport_rows(body_rows(height));

    let mut dirty = true;
    let mut strip_revision = app.strip().revision();
    loop {
        dirty |= app.process_refresh();
        let revision = app.strip().revision();
        if revision != strip_revision {
            strip_revision = revision;
            dirty = true;
        }

        if dirty {
            let frame = render_app(app, width, height);
            draw_frame(&mut session.stdout, &frame)?;
            dirty = false;
        }
        if app.quitting() {
            break;
        }

        if !event::poll(tick)? {
            continue;
        }
        match event::read()? {
            TerminalEvent::Resize(w, h) => {
                width = usize::from(w);
                height = usize::from(h);
                app.set_viewport_rows(body_rows(height));
                dirty = true;
            }
            TerminalEvent::Key(key) => {
                let Some(command) = command_for_key(&key) else {
                    continue;
                };
                match app.apply(command) {
                    Ok(changed) => dirty |= changed,
                    Err(err) => {
                        tracing::warn!(command = ?command, error = %err, "command failed");
                        dirty = true;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn terminal_size() -> io::Result<(usize, usize)> {
    let (width, height) = terminal::size()?;
    Ok((usize::from(width), usize::from(height)))
}

fn draw_frame<W: Write>(out: &mut W, frame: &Frame) -> io::Result<()> {
    queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;
    for (y, line) in frame.lines.iter().enumerate() {
        queue!(out, MoveTo(0, to_u16(y)))?;
        for span in &line.spans {
            queue_style(out, span.role)?;
            queue!(out, Print(&span.text), SetAttribute(Attribute::Reset))?;
        }
    }
    out.flush()
}

fn queue_style<W: Write>(out: &mut W, role: TextRole) -> io::Result<()> {
    match role {
        TextRole::Title => queue!(out, SetAttribute(Attribute::Bold)),
        TextRole::ActiveTab => queue!(
            out,
            SetAttribute(Attribute::Bold),
            SetAttribute(Attribute::Reverse)
        ),
        TextRole::Tab | TextRole::Body => Ok(()),
        TextRole::Rule => queue!(out, SetForegroundColor(Color::DarkGrey)),
        TextRole::Link => queue!(
            out,
            SetForegroundColor(Color::Cyan),
            SetAttribute(Attribute::Underlined)
        ),
        TextRole::SelectedLink => queue!(
            out,
            SetForegroundColor(Color::Cyan),
            SetAttribute(Attribute::Reverse)
        ),
        TextRole::Status => queue!(out, SetAttribute(Attribute::Reverse)),
        TextRole::Alert => queue!(
            out,
            SetForegroundColor(Color::Red),
            SetAttribute(Attribute::Bold)
        ),
    }
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
