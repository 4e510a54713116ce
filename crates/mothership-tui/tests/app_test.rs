use std::sync::Arc;

use mothership_core::models::timestamp_from_unix;
use mothership_core::{ErrorKind, ErrorReport, FilterDescriptor, MemoryStore, QueryStore};
use mothership_notebook::{Notebook, PageHost, RefreshQueue};
use mothership_tui::render::{render_app, TextRole};
use mothership_tui::{App, Command, PageStrip};

fn seed(store: &MemoryStore, rack: u32, chassis: u32, valve: Option<u32>, at: i64, text: &str) {
    let report = ErrorReport::new(rack, chassis, valve, ErrorKind::Hardware, text);
    if let Err(err) = store.add_error(&report, timestamp_from_unix(at)) {
        panic!("seed: {err}");
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 1, 2, None, 10, "Chassis on fire");
    seed(&store, 1, 2, Some(3), 20, "Valve 3 exploded");
    seed(&store, 4, 1, None, 30, "Fan stalled");
    store
}

fn open_app(store: &Arc<MemoryStore>) -> App {
    let strip = Arc::new(PageStrip::new());
    let notebook = Arc::new(Notebook::new(
        Arc::clone(store) as Arc<dyn QueryStore>,
        Arc::clone(&strip) as Arc<dyn PageHost>,
    ));
    let mut app = App::new(notebook, strip, Arc::new(RefreshQueue::new()));
    if let Err(err) = app.start() {
        panic!("start: {err}");
    }
    app
}

fn apply(app: &mut App, command: Command) -> bool {
    match app.apply(command) {
        Ok(changed) => changed,
        Err(err) => panic!("{command:?}: {err}"),
    }
}

fn cursor_to(app: &mut App, index: usize) {
    for _ in 0..=index {
        apply(app, Command::LinkDown);
    }
}

fn selected_target(app: &App) -> Option<FilterDescriptor> {
    app.selected_link().map(|link| link.target)
}

#[test]
fn start_opens_all_tab_with_count() {
    let store = seeded_store();
    let app = open_app(&store);
    assert_eq!(app.strip().titles(), vec!["All".to_string()]);
    assert_eq!(app.strip().active(), Some(0));
    assert_eq!(app.status_line(), "Displaying 3 errors");
    assert!(!app.quitting());
}

#[test]
fn enter_on_chassis_link_creates_then_focuses() {
    let store = seeded_store();
    let mut app = open_app(&store);

    cursor_to(&mut app, 1);
    assert_eq!(
        selected_target(&app),
        Some(FilterDescriptor::Chassis { rack: 1, chassis: 2 })
    );
    assert!(apply(&mut app, Command::ActivateLink));
    assert_eq!(
        app.strip().titles(),
        vec!["All".to_string(), "Rack 1, Chassis 2".to_string()]
    );
    assert_eq!(app.strip().active(), Some(1));
    assert_eq!(app.status_line(), "Displaying 2 errors");

    assert!(apply(&mut app, Command::PrevPage));
    assert_eq!(app.strip().active(), Some(0));
    assert_eq!(app.status_line(), "Displaying 3 errors");
    assert_eq!(
        selected_target(&app),
        Some(FilterDescriptor::Chassis { rack: 1, chassis: 2 }),
        "link cursor of the All tab should be kept"
    );

    assert!(apply(&mut app, Command::ActivateLink));
    assert_eq!(app.strip().len(), 2);
    assert_eq!(app.strip().active(), Some(1));
}

#[test]
fn page_keys_wrap_around() {
    let store = seeded_store();
    let mut app = open_app(&store);
    assert!(!apply(&mut app, Command::NextPage), "single page has nowhere to go");

    cursor_to(&mut app, 0);
    apply(&mut app, Command::ActivateLink);
    assert_eq!(app.strip().active(), Some(1));
    apply(&mut app, Command::NextPage);
    assert_eq!(app.strip().active(), Some(0));
    apply(&mut app, Command::PrevPage);
    assert_eq!(app.strip().active(), Some(1));
}

#[test]
fn cursor_survives_refresh() {
    let store = seeded_store();
    let mut app = open_app(&store);
    cursor_to(&mut app, 4);
    assert_eq!(
        selected_target(&app),
        Some(FilterDescriptor::Valve {
            rack: 1,
            chassis: 2,
            valve: 3
        })
    );

    seed(&store, 9, 9, None, 40, "Late arrival");
    assert!(!apply(&mut app, Command::Refresh));
    assert!(app.process_refresh());
    assert!(!app.process_refresh(), "queued requests collapse into one refresh");

    assert_eq!(app.status_line(), "Displaying 4 errors");
    assert_eq!(
        selected_target(&app),
        Some(FilterDescriptor::Valve {
            rack: 1,
            chassis: 2,
            valve: 3
        })
    );
    let view = app.active_view().map(|(view, _)| view.lines.len());
    assert_eq!(view, Some(4));
}

#[test]
fn closing_a_tab_keeps_view_state_of_renumbered_tabs() {
    let store = seeded_store();
    let mut app = open_app(&store);

    cursor_to(&mut app, 0);
    apply(&mut app, Command::ActivateLink);
    apply(&mut app, Command::PrevPage);
    for _ in 0..5 {
        apply(&mut app, Command::LinkDown);
    }
    assert_eq!(selected_target(&app), Some(FilterDescriptor::Rack { rack: 4 }));
    apply(&mut app, Command::ActivateLink);
    assert_eq!(
        app.strip().titles(),
        vec!["All".to_string(), "Rack 1".to_string(), "Rack 4".to_string()]
    );
    apply(&mut app, Command::LinkDown);
    assert_eq!(selected_target(&app), Some(FilterDescriptor::Rack { rack: 4 }));

    apply(&mut app, Command::PrevPage);
    assert_eq!(app.strip().active(), Some(1));
    assert!(apply(&mut app, Command::CloseTab));

    assert_eq!(
        app.strip().titles(),
        vec!["All".to_string(), "Rack 4".to_string()]
    );
    assert_eq!(app.strip().active(), Some(1));
    assert_eq!(selected_target(&app), Some(FilterDescriptor::Rack { rack: 4 }));
    assert_eq!(app.status_line(), "Displaying 1 errors");
    assert!(!app.quitting());
}

#[test]
fn closing_the_last_tab_quits() {
    let store = seeded_store();
    let mut app = open_app(&store);
    assert!(apply(&mut app, Command::CloseTab));
    assert!(app.quitting());
    assert!(app.notebook().is_window_closed());
    assert!(app.strip().is_window_closed());
    assert!(app.strip().is_empty());
}

#[test]
fn store_failure_is_reported_in_status_line() {
    let store = seeded_store();
    let mut app = open_app(&store);
    store.fail_queries(true);
    apply(&mut app, Command::Refresh);
    assert!(app.process_refresh());

    let status = app.status_line();
    assert!(status.starts_with("Displaying 0 errors"), "status: {status}");
    assert!(status.contains("store error"), "status: {status}");
    let lines = app.active_view().map(|(view, _)| view.lines.len());
    assert_eq!(lines, Some(0));

    let frame = render_app(&app, 80, 8);
    let last = match frame.lines.last() {
        Some(line) => line,
        None => panic!("empty frame"),
    };
    assert!(last.has_role(TextRole::Alert));

    store.fail_queries(false);
    apply(&mut app, Command::Refresh);
    app.process_refresh();
    assert_eq!(app.status_line(), "Displaying 3 errors");
}

#[test]
fn frame_has_title_strip_body_and_status() {
    let store = seeded_store();
    let mut app = open_app(&store);
    app.set_viewport_rows(6);
    cursor_to(&mut app, 1);

    let frame = render_app(&app, 60, 10);
    assert_eq!(frame.lines.len(), 10);
    assert_eq!(frame.lines[0].plain_text(), "EDSAC Status Monitor");
    assert!(frame.lines[1].has_role(TextRole::ActiveTab));
    assert_eq!(
        frame.lines[3].plain_text(),
        "Rack: 1, Chassis: 2: Hardware Error: Chassis on fire"
    );
    assert!(frame.lines[3].has_role(TextRole::SelectedLink));
    assert!(!frame.lines[4].has_role(TextRole::SelectedLink));
    assert_eq!(frame.lines[9].plain_text(), "Displaying 3 errors");
    assert!(frame.lines.iter().all(|line| line.plain_text().chars().count() <= 60));
}

#[test]
fn link_cursor_reveals_scrolled_lines() {
    let store = seeded_store();
    let mut app = open_app(&store);
    app.set_viewport_rows(1);

    assert!(apply(&mut app, Command::ScrollDown));
    let scroll = app.active_view().map(|(_, state)| state.scroll);
    assert_eq!(scroll, Some(1));

    apply(&mut app, Command::LinkDown);
    let state = app.active_view().map(|(_, state)| state);
    assert_eq!(state.map(|s| (s.scroll, s.cursor)), Some((0, Some(0))));

    for _ in 0..6 {
        apply(&mut app, Command::LinkDown);
    }
    let state = app.active_view().map(|(_, state)| state);
    assert_eq!(state.map(|s| (s.scroll, s.cursor)), Some((2, Some(6))));
    assert!(!apply(&mut app, Command::LinkDown), "cursor stops at the last link");
}

#[test]
fn quit_command_sets_quitting() {
    let store = seeded_store();
    let mut app = open_app(&store);
    assert!(apply(&mut app, Command::Quit));
    assert!(app.quitting());
}
