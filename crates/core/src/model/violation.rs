use std::fmt;

//
// ─── RAW SIGNALS ───────────────────────────────────────────────────────────────
//

/// Browser-level signal forwarded by the page host.
///
/// These carry no policy; `ViolationDetector` decides which of them count as
/// integrity violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSignal {
    /// The page became hidden (tab switch, app switch, screen lock).
    VisibilityHidden,
    /// The page became visible again.
    VisibilityVisible,
    /// The window lost input focus.
    WindowBlur,
    /// Fullscreen mode was engaged.
    FullscreenEntered,
    /// Fullscreen mode was left.
    FullscreenExited,
    /// The page is being hidden for navigation or teardown.
    PageHide,
    /// The page is about to unload.
    BeforeUnload,
}

impl RawSignal {
    /// The DOM-style event name, used verbatim in the exit beacon payload.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            RawSignal::VisibilityHidden | RawSignal::VisibilityVisible => "visibilitychange",
            RawSignal::WindowBlur => "blur",
            RawSignal::FullscreenEntered | RawSignal::FullscreenExited => "fullscreenchange",
            RawSignal::PageHide => "pagehide",
            RawSignal::BeforeUnload => "beforeunload",
        }
    }

    /// True for signals that mean the page may be destroyed before a normal
    /// request/response cycle completes.
    #[must_use]
    pub fn is_page_exit(&self) -> bool {
        matches!(self, RawSignal::PageHide | RawSignal::BeforeUnload)
    }
}

//
// ─── VIOLATION REASONS ─────────────────────────────────────────────────────────
//

/// Classified reason reported to the server for one accepted violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    TabSwitch,
    WindowBlur,
    ExitFullscreen,
    PageExit,
}

impl ViolationReason {
    /// The wire tag the server stores and surfaces to proctors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::TabSwitch => "Tab/App switch / Screen lock",
            ViolationReason::WindowBlur => "Window blur",
            ViolationReason::ExitFullscreen => "Exit fullscreen",
            ViolationReason::PageExit => "Page reload / exit",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── DETECTOR ──────────────────────────────────────────────────────────────────
//

/// Classifies raw browser signals into violation reasons.
///
/// Stateful only for fullscreen: leaving fullscreen counts as a violation
/// only while fullscreen was previously engaged, so a platform that never
/// grants fullscreen cannot generate spurious exit violations.
#[derive(Debug, Clone, Default)]
pub struct ViolationDetector {
    fullscreen_engaged: bool,
}

impl ViolationDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fullscreen_engaged(&self) -> bool {
        self.fullscreen_engaged
    }

    /// Classify one signal. Returns `None` for signals that carry no
    /// violation (becoming visible again, entering fullscreen, or a
    /// fullscreen exit without prior engagement).
    pub fn classify(&mut self, signal: RawSignal) -> Option<ViolationReason> {
        match signal {
            RawSignal::VisibilityHidden => Some(ViolationReason::TabSwitch),
            RawSignal::VisibilityVisible => None,
            RawSignal::WindowBlur => Some(ViolationReason::WindowBlur),
            RawSignal::FullscreenEntered => {
                self.fullscreen_engaged = true;
                None
            }
            RawSignal::FullscreenExited => {
                if self.fullscreen_engaged {
                    self.fullscreen_engaged = false;
                    Some(ViolationReason::ExitFullscreen)
                } else {
                    None
                }
            }
            RawSignal::PageHide | RawSignal::BeforeUnload => Some(ViolationReason::PageExit),
        }
    }
}

//
// ─── RESTRICTED INPUT ──────────────────────────────────────────────────────────
//

/// Letter keys blocked in combination with ctrl/cmd: copy, cut, paste,
/// select-all, save, print, find, view-source, and the devtools/address-bar
/// shortcuts.
const BLOCKED_SHORTCUT_KEYS: [&str; 11] = ["c", "x", "v", "a", "s", "p", "f", "u", "k", "l", "j"];

/// Input-layer event subject to suppression. Blocked events are cancelled at
/// the page and never become violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    ContextMenu,
    Copy,
    Cut,
    Paste,
    /// A key press with its modifier state; `key` follows DOM `KeyboardEvent.key`.
    KeyDown { key: String, ctrl_or_meta: bool },
    /// Back/forward navigation attempt (history is pinned on the page).
    BackNavigation,
}

/// What the input layer should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRuling {
    /// Cancel the default action. Not reported anywhere.
    Block,
    /// Let the event through untouched.
    Allow,
}

impl InputEvent {
    /// Suppression ruling for this event.
    #[must_use]
    pub fn ruling(&self) -> InputRuling {
        match self {
            InputEvent::ContextMenu
            | InputEvent::Copy
            | InputEvent::Cut
            | InputEvent::Paste
            | InputEvent::BackNavigation => InputRuling::Block,
            InputEvent::KeyDown { key, ctrl_or_meta } => {
                if key == "PrintScreen" || key == "F12" {
                    return InputRuling::Block;
                }
                if *ctrl_or_meta
                    && BLOCKED_SHORTCUT_KEYS.contains(&key.to_ascii_lowercase().as_str())
                {
                    return InputRuling::Block;
                }
                InputRuling::Allow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_map_to_server_reason_tags() {
        let mut detector = ViolationDetector::new();
        assert_eq!(
            detector.classify(RawSignal::VisibilityHidden),
            Some(ViolationReason::TabSwitch)
        );
        assert_eq!(
            detector.classify(RawSignal::WindowBlur),
            Some(ViolationReason::WindowBlur)
        );
        assert_eq!(
            detector.classify(RawSignal::PageHide),
            Some(ViolationReason::PageExit)
        );
        assert_eq!(
            detector.classify(RawSignal::BeforeUnload),
            Some(ViolationReason::PageExit)
        );
        assert_eq!(detector.classify(RawSignal::VisibilityVisible), None);
    }

    #[test]
    fn fullscreen_exit_requires_prior_engagement() {
        let mut detector = ViolationDetector::new();
        assert_eq!(detector.classify(RawSignal::FullscreenExited), None);

        assert_eq!(detector.classify(RawSignal::FullscreenEntered), None);
        assert!(detector.fullscreen_engaged());
        assert_eq!(
            detector.classify(RawSignal::FullscreenExited),
            Some(ViolationReason::ExitFullscreen)
        );

        // Engagement was consumed; a second exit signal is not a violation.
        assert_eq!(detector.classify(RawSignal::FullscreenExited), None);
    }

    #[test]
    fn reason_tags_match_wire_format() {
        assert_eq!(
            ViolationReason::TabSwitch.as_str(),
            "Tab/App switch / Screen lock"
        );
        assert_eq!(ViolationReason::WindowBlur.as_str(), "Window blur");
        assert_eq!(ViolationReason::ExitFullscreen.as_str(), "Exit fullscreen");
        assert_eq!(ViolationReason::PageExit.as_str(), "Page reload / exit");
    }

    #[test]
    fn beacon_event_names_are_dom_names() {
        assert_eq!(RawSignal::PageHide.event_name(), "pagehide");
        assert_eq!(RawSignal::BeforeUnload.event_name(), "beforeunload");
        assert!(RawSignal::PageHide.is_page_exit());
        assert!(!RawSignal::WindowBlur.is_page_exit());
    }

    #[test]
    fn restricted_shortcuts_are_blocked() {
        for key in ["c", "X", "v", "a", "s", "p", "f", "u", "k", "l", "J"] {
            let event = InputEvent::KeyDown {
                key: key.to_string(),
                ctrl_or_meta: true,
            };
            assert_eq!(event.ruling(), InputRuling::Block, "ctrl+{key}");
        }
    }

    #[test]
    fn plain_typing_is_allowed() {
        let event = InputEvent::KeyDown {
            key: "c".to_string(),
            ctrl_or_meta: false,
        };
        assert_eq!(event.ruling(), InputRuling::Allow);

        let event = InputEvent::KeyDown {
            key: "Enter".to_string(),
            ctrl_or_meta: true,
        };
        assert_eq!(event.ruling(), InputRuling::Allow);
    }

    #[test]
    fn devtools_and_clipboard_events_are_blocked() {
        for key in ["PrintScreen", "F12"] {
            let event = InputEvent::KeyDown {
                key: key.to_string(),
                ctrl_or_meta: false,
            };
            assert_eq!(event.ruling(), InputRuling::Block);
        }
        assert_eq!(InputEvent::ContextMenu.ruling(), InputRuling::Block);
        assert_eq!(InputEvent::Copy.ruling(), InputRuling::Block);
        assert_eq!(InputEvent::Cut.ruling(), InputRuling::Block);
        assert_eq!(InputEvent::Paste.ruling(), InputRuling::Block);
        assert_eq!(InputEvent::BackNavigation.ruling(), InputRuling::Block);
    }
}
