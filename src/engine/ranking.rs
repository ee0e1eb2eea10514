use std::collections::HashMap;

use crate::models::{
    participant::{LeaderboardEntry, Participant},
    user::UserIdentity,
};

/// Orders submitted participants by score (desc) then time taken (asc).
///
/// Ranks are strictly sequential. Remaining ties fall back to submission
/// time and user id so the order never depends on storage order.
/// Participants without a submission or a known user are left out.
pub fn rank(
    participants: Vec<Participant>,
    users: &HashMap<i64, UserIdentity>,
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<_> = participants
        .into_iter()
        .filter_map(|p| {
            let user = users.get(&p.user_id)?;
            let submission = p.submission?;
            Some((p.user_id, user, submission))
        })
        .collect();

    rows.sort_by(|(a_id, _, a), (b_id, _, b)| {
        b.score
            .cmp(&a.score)
            .then(a.time_taken_seconds.cmp(&b.time_taken_seconds))
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then(a_id.cmp(b_id))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (user_id, user, submission))| LeaderboardEntry {
            rank: i + 1,
            user_id,
            username: user.username.clone(),
            full_name: user.display_name().to_string(),
            score: submission.score,
            time_taken_seconds: submission.time_taken_seconds,
            submitted_at: submission.submitted_at,
        })
        .collect()
}
