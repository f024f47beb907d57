//! Event-mask composition and decoding.
//!
//! Maps the named event kinds accepted on the wire to raw inotify bits,
//! and a received mask back to a single symbolic name for log output.

/// Composes an inotify event mask from a list of named event kinds.
///
/// Recognized names (case-sensitive): `all`, `access`, `modify`,
/// `attrib`, `open`, `close`, `create`, `delete`, `move`. `close` and
/// `move` expand to their composite bits. Unrecognized names are
/// silently ignored.
pub fn mask_from_events<S: AsRef<str>>(events: &[S]) -> u32 {
    let mut mask = 0;
    for event in events {
        mask |= match event.as_ref() {
            "all" => libc::IN_ALL_EVENTS,
            "access" => libc::IN_ACCESS,
            "modify" => libc::IN_MODIFY,
            "attrib" => libc::IN_ATTRIB,
            "open" => libc::IN_OPEN,
            "close" => libc::IN_CLOSE,
            "create" => libc::IN_CREATE,
            "delete" => libc::IN_DELETE,
            "move" => libc::IN_MOVE,
            _ => 0,
        };
    }
    mask
}

/// Decodes an event mask into its single dominant symbolic name.
///
/// When multiple bits are set, the first match in a fixed priority
/// order wins. Combined events (e.g. `IN_MODIFY|IN_ATTRIB`) therefore
/// report only their highest-priority bit; this mirrors the wire
/// contract and is deliberately lossy.
#[must_use]
pub fn dominant_event_name(mask: u32) -> Option<&'static str> {
    const PRIORITY: &[(u32, &str)] = &[
        (libc::IN_ACCESS, "IN_ACCESS"),
        (libc::IN_MODIFY, "IN_MODIFY"),
        (libc::IN_ATTRIB, "IN_ATTRIB"),
        (libc::IN_OPEN, "IN_OPEN"),
        (libc::IN_CLOSE_WRITE, "IN_CLOSE_WRITE"),
        (libc::IN_CLOSE_NOWRITE, "IN_CLOSE_NOWRITE"),
        (libc::IN_CREATE, "IN_CREATE"),
        (libc::IN_DELETE, "IN_DELETE"),
        (libc::IN_DELETE_SELF, "IN_DELETE_SELF"),
        (libc::IN_MOVED_FROM, "IN_MOVED_FROM"),
        (libc::IN_MOVED_TO, "IN_MOVED_TO"),
        (libc::IN_MOVE_SELF, "IN_MOVE_SELF"),
    ];
    PRIORITY
        .iter()
        .find(|(bit, _)| mask & bit != 0)
        .map(|&(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_and_create_compose_exactly() {
        let mask = mask_from_events(&["modify", "create"]);
        assert_eq!(mask, libc::IN_MODIFY | libc::IN_CREATE);
    }

    #[test]
    fn all_expands_to_all_events() {
        assert_eq!(mask_from_events(&["all"]), libc::IN_ALL_EVENTS);
    }

    #[test]
    fn close_expands_to_both_close_bits() {
        assert_eq!(
            mask_from_events(&["close"]),
            libc::IN_CLOSE_WRITE | libc::IN_CLOSE_NOWRITE
        );
    }

    #[test]
    fn unknown_names_are_ignored() {
        assert_eq!(
            mask_from_events(&["bogus", "delete", "MODIFY"]),
            libc::IN_DELETE
        );
    }

    #[test]
    fn empty_list_is_empty_mask() {
        assert_eq!(mask_from_events::<&str>(&[]), 0);
    }

    #[test]
    fn dominant_name_follows_priority_order() {
        assert_eq!(
            dominant_event_name(libc::IN_MODIFY | libc::IN_ATTRIB),
            Some("IN_MODIFY")
        );
        assert_eq!(dominant_event_name(libc::IN_CREATE), Some("IN_CREATE"));
        assert_eq!(
            dominant_event_name(libc::IN_MOVED_TO | libc::IN_MOVE_SELF),
            Some("IN_MOVED_TO")
        );
    }

    #[test]
    fn dominant_name_is_none_for_unknown_bits() {
        assert_eq!(dominant_event_name(0), None);
        assert_eq!(dominant_event_name(libc::IN_IGNORED), None);
    }
}
