use client_core::{Screen, SessionSnapshot};

pub const LOGIN_HEADING: &str = "Welcome to decentralized voting application";
pub const CLOSED_HEADING: &str = "Voting is finished";

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    match snapshot.screen() {
        Screen::Login => format!("{LOGIN_HEADING}\nRun `voter connect` to link your wallet account."),
        Screen::Closed => format!("{CLOSED_HEADING}\nThe contract no longer accepts votes."),
        Screen::Voting { can_vote } => render_voting(snapshot, can_vote),
    }
}

fn render_voting(snapshot: &SessionSnapshot, can_vote: bool) -> String {
    let mut out = String::new();
    if let Some(account) = &snapshot.account {
        out.push_str(&format!("Connected account: {account}\n"));
    }
    if let Some(chain_id) = snapshot.chain_id {
        out.push_str(&format!("Network: {chain_id}\n"));
    }
    match snapshot.remaining_time {
        Some(remaining) => out.push_str(&format!("Remaining time: {remaining}\n")),
        None => out.push_str("Remaining time: unknown\n"),
    }

    let name_width = snapshot
        .candidates
        .iter()
        .map(|candidate| candidate.name.chars().count())
        .chain(std::iter::once("Candidate".len()))
        .max()
        .unwrap_or_default();
    out.push_str(&format!("{:<5}  {:<name_width$}  Votes\n", "Index", "Candidate"));
    for candidate in &snapshot.candidates {
        out.push_str(&format!(
            "{:<5}  {:<name_width$}  {}\n",
            candidate.index, candidate.name, candidate.vote_count
        ));
    }

    if can_vote {
        out.push_str("Cast your vote with `voter vote <INDEX>`.");
    } else {
        out.push_str("You have already voted.");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::ConnectionState;
    use shared::domain::{AccountAddress, Candidate, ChainId};

    fn snapshot(state: ConnectionState, voting_open: bool, can_vote: bool) -> SessionSnapshot {
        SessionSnapshot {
            state,
            account: (state == ConnectionState::Connected)
                .then(|| AccountAddress::from_bytes([0xab; 20])),
            chain_id: Some(ChainId(1337)),
            candidates: vec![
                Candidate {
                    index: 0,
                    name: "Alice".into(),
                    vote_count: 4,
                },
                Candidate {
                    index: 1,
                    name: "Bartholomew".into(),
                    vote_count: 0,
                },
            ],
            voting_open,
            remaining_time: Some(120),
            can_vote,
        }
    }

    #[test]
    fn read_only_session_renders_login() {
        let out = render_snapshot(&snapshot(ConnectionState::ReadOnly, true, true));
        assert!(out.starts_with(LOGIN_HEADING));
    }

    #[test]
    fn closed_voting_overrides_connected_panel() {
        let out = render_snapshot(&snapshot(ConnectionState::Connected, false, true));
        assert!(out.starts_with(CLOSED_HEADING));
    }

    #[test]
    fn voting_panel_lists_candidates_and_gates_hint() {
        let out = render_snapshot(&snapshot(ConnectionState::Connected, true, true));
        assert!(out.contains("Connected account: 0xabababababababababababababababababababab"));
        assert!(out.contains("Network: 0x539"));
        assert!(out.contains("Remaining time: 120"));
        assert!(out.contains("0      Alice        4"));
        assert!(out.contains("1      Bartholomew  0"));
        assert!(out.ends_with("`voter vote <INDEX>`."));

        let voted = render_snapshot(&snapshot(ConnectionState::Connected, true, false));
        assert!(voted.ends_with("You have already voted."));
    }
}
