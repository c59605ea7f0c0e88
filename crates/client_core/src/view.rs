use crate::SessionSnapshot;

/// Which screen the front-end shows for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Voting { can_vote: bool },
    Closed,
}

/// Closed voting wins over connection state.
pub fn select_screen(snapshot: &SessionSnapshot) -> Screen {
    if !snapshot.voting_open {
        Screen::Closed
    } else if snapshot.is_connected() {
        Screen::Voting {
            can_vote: snapshot.can_vote,
        }
    } else {
        Screen::Login
    }
}
