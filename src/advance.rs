//! Advancement engine. When a match completes, its winner (and in double
//! elimination its loser) is routed into the downstream slot named by the
//! bracket's structural document. Slot filling is first-empty-wins and
//! idempotent: a team already seated in the target match is never seated
//! twice, so re-running a completion cannot double-fill.

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::ActionContext;
use crate::store::TournamentRecords;
use crate::types::*;
use tracing::error;

/// Route the completed match's teams onward. `winner_id` goes to the
/// descriptor's `next_match_number`; `loser_id` (when there is a loser and a
/// drop-down pointer) goes to `loser_next_match_number`. A missing bracket or
/// dangling pointer is a fatal consistency error: the graph this match claims
/// to belong to does not exist, and guessing would corrupt the tournament.
pub fn apply_advancement(
    records: &mut TournamentRecords,
    match_number: MatchNumber,
    winner_id: TeamId,
    loser_id: Option<TeamId>,
    ctx: &ActionContext,
) -> CoreResult<()> {
    let (next, loser_next, position) = {
        let bracket = records.bracket.as_ref().ok_or_else(|| {
            error!("advancement for match #{match_number} with no bracket record");
            CoreError::consistency(format!(
                "match #{match_number} completed but no bracket has been generated"
            ))
        })?;
        let desc = bracket
            .bracket_data
            .descriptor(match_number)
            .ok_or_else(|| {
                error!("match #{match_number} is missing from the bracket structure");
                CoreError::consistency(format!(
                    "match #{match_number} is not part of the bracket structure"
                ))
            })?;
        (desc.next_match_number, desc.loser_next_match_number, desc.position)
    };

    let Some(next) = next else {
        // This was the final; nothing downstream.
        return Ok(());
    };

    fill_slot(records, next, winner_id)?;
    if let (Some(loser_next), Some(loser)) = (loser_next, loser_id) {
        fill_slot(records, loser_next, loser)?;
    }

    if position == BracketPosition::GrandFinal {
        skip_reset_if_decided(records, match_number, next, winner_id, ctx)?;
    }
    Ok(())
}

/// Seat `team_id` in the downstream match: first empty slot wins. Both slots
/// already full is a generation bug and aborts loudly. Readiness follows the
/// fill: both slots present makes the match ready, a half-filled match goes
/// (back) to pending.
fn fill_slot(
    records: &mut TournamentRecords,
    target_number: MatchNumber,
    team_id: TeamId,
) -> CoreResult<()> {
    let idx = records.match_index_by_number(target_number).ok_or_else(|| {
        error!("advancement target match #{target_number} has no match row");
        CoreError::consistency(format!(
            "advancement target match #{target_number} does not exist"
        ))
    })?;
    let m = &mut records.matches[idx];

    if m.team1_id == Some(team_id) || m.team2_id == Some(team_id) {
        return Ok(());
    }
    if m.status.is_terminal() {
        // A skipped bracket reset; nothing left to seat.
        return Ok(());
    }
    if m.team1_id.is_none() {
        m.team1_id = Some(team_id);
    } else if m.team2_id.is_none() {
        m.team2_id = Some(team_id);
    } else {
        error!(
            "advancement target match #{target_number} already has both slots filled ({:?} vs {:?})",
            m.team1_id, m.team2_id
        );
        return Err(CoreError::consistency(format!(
            "advancement target match #{target_number} already has both slots filled"
        )));
    }

    if matches!(m.status, MatchStatus::Pending | MatchStatus::Ready) {
        m.status = if m.both_slots_filled() {
            MatchStatus::Ready
        } else {
            MatchStatus::Pending
        };
    }
    Ok(())
}

/// Reject unless the downstream match is still waiting (pending/ready). Used
/// by rollback before any mutation happens.
pub fn check_unwindable(records: &TournamentRecords, target_number: MatchNumber) -> CoreResult<()> {
    let idx = records.match_index_by_number(target_number).ok_or_else(|| {
        CoreError::consistency(format!(
            "advancement target match #{target_number} does not exist"
        ))
    })?;
    let m = &records.matches[idx];
    if !matches!(m.status, MatchStatus::Pending | MatchStatus::Ready) {
        return Err(CoreError::invalid_state(format!(
            "match #{target_number} has already progressed; roll it back first"
        )));
    }
    Ok(())
}

/// Remove a previously advanced team from the downstream match (rollback
/// path). The caller has already verified the target is unwindable.
pub fn unwind_slot(
    records: &mut TournamentRecords,
    target_number: MatchNumber,
    team_id: TeamId,
) -> CoreResult<()> {
    let idx = records.match_index_by_number(target_number).ok_or_else(|| {
        CoreError::consistency(format!(
            "advancement target match #{target_number} does not exist"
        ))
    })?;
    let m = &mut records.matches[idx];
    if m.team1_id == Some(team_id) {
        m.team1_id = None;
        m.team1_checked_in = false;
    } else if m.team2_id == Some(team_id) {
        m.team2_id = None;
        m.team2_checked_in = false;
    } else {
        return Ok(());
    }
    if matches!(m.status, MatchStatus::Pending | MatchStatus::Ready) {
        m.status = MatchStatus::Pending;
    }
    Ok(())
}

/// Double elimination: when the winners-bracket champion also takes the first
/// grand final, the bracket-reset match never happens. Mark it completed for
/// the champion instead of leaving it dangling.
fn skip_reset_if_decided(
    records: &mut TournamentRecords,
    grand_final_number: MatchNumber,
    reset_number: MatchNumber,
    winner_id: TeamId,
    ctx: &ActionContext,
) -> CoreResult<()> {
    let winners_final_number = records.bracket.as_ref().and_then(|bracket| {
        bracket
            .bracket_data
            .structure
            .iter()
            .find(|d| {
                d.position == BracketPosition::Winners
                    && d.next_match_number == Some(grand_final_number)
            })
            .map(|d| d.match_number)
    });
    let Some(winners_final_number) = winners_final_number else {
        return Ok(());
    };
    let winners_champion = records
        .match_index_by_number(winners_final_number)
        .and_then(|idx| records.matches[idx].winner_id);
    if winners_champion != Some(winner_id) {
        // Losers-side champion forced the reset; the second grand final
        // plays out normally.
        return Ok(());
    }

    let Some(reset_idx) = records.match_index_by_number(reset_number) else {
        return Ok(());
    };
    let (reset_id, prev, new) = {
        let reset = &mut records.matches[reset_idx];
        if reset.status.is_terminal() {
            return Ok(());
        }
        let prev = crate::lifecycle::match_snapshot(reset);
        reset.status = MatchStatus::Completed;
        reset.winner_id = Some(winner_id);
        reset.completed_at = Some(ctx.now);
        reset.note =
            Some("Bracket reset not required; winners champion won the grand final".to_string());
        (reset.id, prev, crate::lifecycle::match_snapshot(reset))
    };
    records.push_history(MatchHistoryEntry {
        match_id: reset_id,
        action: "bracket_reset_skipped".to_string(),
        performed_by: ctx.performed_by.clone(),
        performed_by_role: ctx.role.clone(),
        previous_state: prev,
        new_state: new,
        reason: None,
        created_at: ctx.now,
    });
    Ok(())
}
