//! Bracket generation. Pure: given an ordered team list and a format this
//! produces the complete structural document (`BracketData`) before anything
//! is persisted. Match numbers are a dense 1-based sequence assigned in
//! generation order; the advancement pointer arithmetic depends on that order
//! and nothing may renumber matches afterwards.

use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// Build the match graph for `teams`. Callers must have rejected lists of
/// fewer than two teams already; the builder itself does not validate.
///
/// With `randomize` the team order is shuffled uniformly (Fisher-Yates via
/// `rand`); otherwise the input order is treated as seed order.
pub fn build_bracket(
    teams: &[Team],
    format: BracketFormat,
    randomize: bool,
    rng: &mut impl Rng,
) -> BracketData {
    let mut order: Vec<TeamId> = teams.iter().map(|t| t.id).collect();
    if randomize {
        order.shuffle(rng);
    }

    let team_count = order.len();
    let bracket_size = next_power_of_two(team_count.max(2));
    let bye_count = (bracket_size - team_count) as u32;
    let total_rounds = bracket_size.trailing_zeros();

    let slots = seed_slots(&order, bracket_size, bye_count as usize);

    match format {
        BracketFormat::SingleElimination => {
            let structure = winners_structure(&slots, bracket_size, total_rounds, true);
            BracketData {
                structure,
                total_rounds,
                bye_count,
                winners_rounds: None,
                losers_rounds: None,
            }
        }
        BracketFormat::DoubleElimination => {
            let structure = double_elimination_structure(&slots, bracket_size, total_rounds);
            BracketData {
                structure,
                total_rounds,
                bye_count,
                winners_rounds: Some(total_rounds),
                losers_rounds: Some(2 * (total_rounds.saturating_sub(1))),
            }
        }
    }
}

/// Lay teams into the round-1 slot array. Byes come first: each of the first
/// `bye_count` pairings seats one team against an empty slot, so the
/// lowest-indexed seeds face byes.
fn seed_slots(order: &[TeamId], bracket_size: usize, bye_count: usize) -> Vec<Option<TeamId>> {
    let mut slots: Vec<Option<TeamId>> = Vec::with_capacity(bracket_size);
    let mut teams = order.iter().copied();
    for _ in 0..bye_count {
        slots.push(teams.next());
        slots.push(None);
    }
    for team in teams {
        slots.push(Some(team));
    }
    debug_assert_eq!(slots.len(), bracket_size);
    slots
}

/// Generate the winners-side rounds. Round 1 pairs slot `2i` against `2i+1`;
/// every later round starts with both slots empty, to be filled by
/// advancement. Round-r matches point at `first_of_next_round + i/2`.
///
/// In single elimination (`final_is_grand = true`) the last round's match is
/// the grand final and has no next pointer; in double elimination every
/// generated match is tagged `winners` and the final's pointers get patched
/// in afterwards.
fn winners_structure(
    slots: &[Option<TeamId>],
    bracket_size: usize,
    total_rounds: u32,
    final_is_grand: bool,
) -> Vec<MatchDescriptor> {
    let mut structure = Vec::with_capacity(bracket_size - 1);
    let mut number: MatchNumber = 1;

    for round in 1..=total_rounds {
        let count = (bracket_size >> round) as u32;
        let first = number;
        let first_of_next = first + count;
        for i in 0..count {
            let last_round = round == total_rounds;
            let (team1, team2) = if round == 1 {
                (slots[(i * 2) as usize], slots[(i * 2 + 1) as usize])
            } else {
                (None, None)
            };
            structure.push(MatchDescriptor {
                match_number: number,
                round_number: round,
                team1_id: team1,
                team2_id: team2,
                next_match_number: if last_round { None } else { Some(first_of_next + i / 2) },
                loser_next_match_number: None,
                position: if last_round && final_is_grand {
                    BracketPosition::GrandFinal
                } else {
                    BracketPosition::Winners
                },
            });
            number += 1;
        }
    }
    structure
}

/// Full double-elimination graph: winners bracket, losers bracket, and two
/// grand finals (the second is the conditional bracket reset). Losers rounds
/// come in pairs: the odd round merges drop-downs (or previous losers-round
/// winners) and the even round pits its winner against the loser falling out
/// of the next winners round.
fn double_elimination_structure(
    slots: &[Option<TeamId>],
    bracket_size: usize,
    total_rounds: u32,
) -> Vec<MatchDescriptor> {
    let mut structure = winners_structure(slots, bracket_size, total_rounds, false);

    let mut winners_numbers: Vec<Vec<MatchNumber>> = Vec::new();
    for round in 1..=total_rounds {
        winners_numbers.push(
            structure
                .iter()
                .filter(|d| d.round_number == round)
                .map(|d| d.match_number)
                .collect(),
        );
    }

    let mut number = structure.len() as MatchNumber + 1;
    let gf1 = 2 * bracket_size as MatchNumber - 2;
    let gf2 = gf1 + 1;

    // Losers rounds, stored per round for pointer patching below.
    let mut losers_numbers: Vec<Vec<MatchNumber>> = Vec::new();
    for pair in 1..total_rounds {
        let count = (bracket_size >> (pair + 1)) as u32;
        let first_odd = number;
        for j in 0..count {
            structure.push(MatchDescriptor {
                match_number: number,
                round_number: 2 * pair - 1,
                team1_id: None,
                team2_id: None,
                next_match_number: Some(first_odd + count + j),
                loser_next_match_number: None,
                position: BracketPosition::Losers,
            });
            number += 1;
        }
        losers_numbers.push((first_odd..first_odd + count).collect());

        let first_even = number;
        let last_pair = pair == total_rounds - 1;
        for j in 0..count {
            structure.push(MatchDescriptor {
                match_number: number,
                round_number: 2 * pair,
                team1_id: None,
                team2_id: None,
                next_match_number: if last_pair { Some(gf1) } else { Some(first_even + count + j / 2) },
                loser_next_match_number: None,
                position: BracketPosition::Losers,
            });
            number += 1;
        }
        losers_numbers.push((first_even..first_even + count).collect());
    }

    // Winners-side loser drop-downs. Round 1 pairs feed the first losers
    // round two-at-a-time; every later winners round drops into its even
    // losers round slot-for-slot.
    if total_rounds > 1 {
        for (j, wnum) in winners_numbers[0].clone().into_iter().enumerate() {
            patch_pointers(&mut structure, wnum, None, Some(losers_numbers[0][j / 2]));
        }
        for round_index in 1..total_rounds as usize {
            let even_round = &losers_numbers[2 * round_index - 1];
            for (j, wnum) in winners_numbers[round_index].clone().into_iter().enumerate() {
                patch_pointers(&mut structure, wnum, None, Some(even_round[j]));
            }
        }
    }

    // Winners final routes into the grand final; with only one winners round
    // (two teams) both finalists come straight from it.
    let winners_final = *winners_numbers
        .last()
        .and_then(|round| round.first())
        .expect("winners bracket has at least one round");
    if total_rounds > 1 {
        patch_pointers(&mut structure, winners_final, Some(gf1), None);
    } else {
        patch_pointers(&mut structure, winners_final, Some(gf1), Some(gf1));
    }

    debug_assert_eq!(number, gf1);
    structure.push(MatchDescriptor {
        match_number: gf1,
        round_number: total_rounds + 1,
        team1_id: None,
        team2_id: None,
        next_match_number: Some(gf2),
        loser_next_match_number: Some(gf2),
        position: BracketPosition::GrandFinal,
    });
    structure.push(MatchDescriptor {
        match_number: gf2,
        round_number: total_rounds + 2,
        team1_id: None,
        team2_id: None,
        next_match_number: None,
        loser_next_match_number: None,
        position: BracketPosition::GrandFinal,
    });

    structure
}

fn patch_pointers(
    structure: &mut [MatchDescriptor],
    match_number: MatchNumber,
    next: Option<MatchNumber>,
    loser_next: Option<MatchNumber>,
) {
    if let Some(desc) = structure.iter_mut().find(|d| d.match_number == match_number) {
        if next.is_some() {
            desc.next_match_number = next;
        }
        if loser_next.is_some() {
            desc.loser_next_match_number = loser_next;
        }
    }
}

fn next_power_of_two(n: usize) -> usize {
    let value = n.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn make_teams(n: u32) -> Vec<Team> {
        (1..=n).map(|id| Team { id, name: format!("Team {id}") }).collect()
    }

    fn fixed_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_single_elim_match_counts() {
        for n in 2..=33u32 {
            let teams = make_teams(n);
            let data = build_bracket(&teams, BracketFormat::SingleElimination, false, &mut fixed_rng());
            let bracket_size = (n as usize).next_power_of_two();
            assert_eq!(data.structure.len(), bracket_size - 1, "team count {n}");
            assert_eq!(data.bye_count as usize, bracket_size - n as usize, "team count {n}");

            let one_slot_round_one = data
                .structure
                .iter()
                .filter(|d| d.round_number == 1)
                .filter(|d| d.team1_id.is_some() != d.team2_id.is_some())
                .count();
            assert_eq!(one_slot_round_one, data.bye_count as usize, "team count {n}");
        }
    }

    #[test]
    fn test_round_one_pointers_terminate_at_grand_final() {
        for n in [2u32, 3, 5, 8, 13, 16, 21] {
            let teams = make_teams(n);
            let data = build_bracket(&teams, BracketFormat::SingleElimination, false, &mut fixed_rng());
            let by_number: HashMap<_, _> =
                data.structure.iter().map(|d| (d.match_number, d)).collect();

            let mut finals_reached = std::collections::HashSet::new();
            for desc in data.structure.iter().filter(|d| d.round_number == 1) {
                let mut current: &MatchDescriptor = desc;
                let mut hops = 0;
                while let Some(next) = current.next_match_number {
                    current = by_number.get(&next).copied().unwrap();
                    hops += 1;
                    assert!(hops <= data.total_rounds, "pointer chain too long for n={n}");
                }
                assert_eq!(current.position, BracketPosition::GrandFinal);
                finals_reached.insert(current.match_number);
            }
            assert_eq!(finals_reached.len(), 1, "exactly one final for n={n}");
        }
    }

    #[test]
    fn test_five_team_layout() {
        let teams = make_teams(5);
        let data = build_bracket(&teams, BracketFormat::SingleElimination, false, &mut fixed_rng());
        assert_eq!(data.bye_count, 3);
        assert_eq!(data.total_rounds, 3);

        let round_one: Vec<_> = data.structure.iter().filter(|d| d.round_number == 1).collect();
        assert_eq!(round_one.len(), 4);
        // Lowest-indexed seeds face byes, in order.
        assert_eq!((round_one[0].team1_id, round_one[0].team2_id), (Some(1), None));
        assert_eq!((round_one[1].team1_id, round_one[1].team2_id), (Some(2), None));
        assert_eq!((round_one[2].team1_id, round_one[2].team2_id), (Some(3), None));
        assert_eq!((round_one[3].team1_id, round_one[3].team2_id), (Some(4), Some(5)));

        // Round-1 next pointers: floor(bracketSize/2) + floor(i/2) + 1.
        assert_eq!(round_one[0].next_match_number, Some(5));
        assert_eq!(round_one[1].next_match_number, Some(5));
        assert_eq!(round_one[2].next_match_number, Some(6));
        assert_eq!(round_one[3].next_match_number, Some(6));

        let final_match = data.structure.iter().find(|d| d.match_number == 7).unwrap();
        assert_eq!(final_match.position, BracketPosition::GrandFinal);
        assert_eq!(final_match.next_match_number, None);
    }

    #[test]
    fn test_match_numbers_dense_in_generation_order() {
        let teams = make_teams(12);
        for format in [BracketFormat::SingleElimination, BracketFormat::DoubleElimination] {
            let data = build_bracket(&teams, format, false, &mut fixed_rng());
            for (i, desc) in data.structure.iter().enumerate() {
                assert_eq!(desc.match_number, i as MatchNumber + 1);
            }
        }
    }

    #[test]
    fn test_double_elim_shape_four_teams() {
        let teams = make_teams(4);
        let data = build_bracket(&teams, BracketFormat::DoubleElimination, false, &mut fixed_rng());
        // W1 x2, W2, L1, L2, GF1, GF2.
        assert_eq!(data.structure.len(), 7);
        assert_eq!(data.winners_rounds, Some(2));
        assert_eq!(data.losers_rounds, Some(2));

        let by_number: HashMap<_, _> = data.structure.iter().map(|d| (d.match_number, d)).collect();

        // Round-1 losers drop into L1 (match 4).
        assert_eq!(by_number[&1].loser_next_match_number, Some(4));
        assert_eq!(by_number[&2].loser_next_match_number, Some(4));
        // Winners final: winner to GF1, loser to the losers final.
        assert_eq!(by_number[&3].next_match_number, Some(6));
        assert_eq!(by_number[&3].loser_next_match_number, Some(5));
        // Losers final feeds GF1; GF1 feeds the reset both ways.
        assert_eq!(by_number[&5].next_match_number, Some(6));
        assert_eq!(by_number[&6].next_match_number, Some(7));
        assert_eq!(by_number[&6].loser_next_match_number, Some(7));
        assert_eq!(by_number[&7].next_match_number, None);

        assert_eq!(by_number[&6].position, BracketPosition::GrandFinal);
        assert_eq!(by_number[&7].position, BracketPosition::GrandFinal);
        assert_eq!(by_number[&4].position, BracketPosition::Losers);
    }

    #[test]
    fn test_double_elim_shape_eight_teams() {
        let teams = make_teams(8);
        let data = build_bracket(&teams, BracketFormat::DoubleElimination, false, &mut fixed_rng());
        // Winners 7, losers 6, grand finals 2.
        assert_eq!(data.structure.len(), 15);
        let losers = data
            .structure
            .iter()
            .filter(|d| d.position == BracketPosition::Losers)
            .count();
        assert_eq!(losers, 6);

        // Every winners-side match routes its loser somewhere.
        for desc in data.structure.iter().filter(|d| d.position == BracketPosition::Winners) {
            assert!(desc.loser_next_match_number.is_some(), "match {}", desc.match_number);
        }
    }

    #[test]
    fn test_double_elim_two_teams() {
        let teams = make_teams(2);
        let data = build_bracket(&teams, BracketFormat::DoubleElimination, false, &mut fixed_rng());
        // W1, GF1, GF2 — no losers rounds.
        assert_eq!(data.structure.len(), 3);
        assert_eq!(data.losers_rounds, Some(0));
        let w1 = &data.structure[0];
        assert_eq!(w1.next_match_number, Some(2));
        assert_eq!(w1.loser_next_match_number, Some(2));
    }

    #[test]
    fn test_randomize_is_a_permutation() {
        let teams = make_teams(9);
        let data = build_bracket(&teams, BracketFormat::SingleElimination, true, &mut fixed_rng());
        let mut seen: Vec<TeamId> = data
            .structure
            .iter()
            .flat_map(|d| [d.team1_id, d.team2_id])
            .flatten()
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_randomize_covers_all_permutations() {
        // Statistical check on a seeded rng: all 6 orderings of 3 teams show
        // up, and none dominates.
        let teams = make_teams(3);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<Vec<TeamId>, u32> = HashMap::new();
        for _ in 0..600 {
            let data = build_bracket(&teams, BracketFormat::SingleElimination, true, &mut rng);
            let order: Vec<TeamId> = data
                .structure
                .iter()
                .filter(|d| d.round_number == 1)
                .flat_map(|d| [d.team1_id, d.team2_id])
                .flatten()
                .collect();
            *counts.entry(order).or_default() += 1;
        }
        assert_eq!(counts.len(), 6);
        for (order, count) in counts {
            assert!(count > 40, "ordering {order:?} appeared only {count} times");
        }
    }
}
