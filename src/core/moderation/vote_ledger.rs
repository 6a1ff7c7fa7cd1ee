// In-memory vote ledger - tally state for open spam/ham ballots.
//
// Owned exclusively by the moderation engine. Ballots live only for the
// lifetime of the process; an open ballot is lost on restart, which is an
// accepted property of the design.

use dashmap::DashMap;
use std::collections::HashSet;

/// Which way a voter decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePolarity {
    Spam,
    Ham,
}

/// Ballot key: the message being voted on.
pub type BallotKey = (i64, i64); // (chat_id, message_id)

/// What the engine needs to act once a ballot reaches consensus.
#[derive(Debug, Clone, PartialEq)]
pub struct BallotContext {
    pub text: String,
    pub author_id: Option<u64>,
    pub prompt_message_id: i64,
}

#[derive(Debug, Default)]
struct Ballot {
    context: Option<BallotContext>,
    spam_voters: HashSet<u64>,
    ham_voters: HashSet<u64>,
}

/// Result of casting a single vote.
#[derive(Debug, Clone, PartialEq)]
pub enum CastResult {
    /// Ballot still pending. Counts are distinct-voter tallies after the cast.
    Counted { spam_votes: usize, ham_votes: usize },
    /// The cast polarity reached the threshold. The ballot has been removed;
    /// both tallies are gone with it.
    Consensus {
        polarity: VotePolarity,
        context: Option<BallotContext>,
    },
}

/// Per-(chat, message) tally of distinct spam/ham voters.
///
/// State machine: no ballot -> pending -> consensus (removed). There is no
/// timeout transition; a ballot short of the threshold stays pending until
/// the process exits.
pub struct VoteLedger {
    threshold: usize,
    ballots: DashMap<BallotKey, Ballot>,
}

impl VoteLedger {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            ballots: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Open a ballot with the context needed to act on consensus.
    /// Re-opening an existing ballot replaces its context but keeps tallies.
    pub fn open(&self, key: BallotKey, context: BallotContext) {
        self.ballots.entry(key).or_default().context = Some(context);
    }

    pub fn is_open(&self, key: BallotKey) -> bool {
        self.ballots.contains_key(&key)
    }

    pub fn open_ballots(&self) -> usize {
        self.ballots.len()
    }

    /// Cast a vote. A first vote against an unknown key opens a context-less
    /// pending ballot. Re-casting the same polarity by the same voter never
    /// increases the tally.
    pub fn cast(&self, key: BallotKey, voter_id: u64, polarity: VotePolarity) -> CastResult {
        let (spam_votes, ham_votes) = {
            let mut ballot = self.ballots.entry(key).or_default();
            let voters = match polarity {
                VotePolarity::Spam => &mut ballot.spam_voters,
                VotePolarity::Ham => &mut ballot.ham_voters,
            };
            voters.insert(voter_id);
            (ballot.spam_voters.len(), ballot.ham_voters.len())
        };

        let cast_tally = match polarity {
            VotePolarity::Spam => spam_votes,
            VotePolarity::Ham => ham_votes,
        };
        if cast_tally >= self.threshold {
            // Consensus clears the whole ballot, losing side included.
            let context = self.ballots.remove(&key).and_then(|(_, b)| b.context);
            CastResult::Consensus { polarity, context }
        } else {
            CastResult::Counted {
                spam_votes,
                ham_votes,
            }
        }
    }

    /// Drop a ballot without a decision (e.g. the message vanished).
    pub fn discard(&self, key: BallotKey) -> Option<BallotContext> {
        self.ballots.remove(&key).and_then(|(_, b)| b.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(prompt: i64) -> BallotContext {
        BallotContext {
            text: "buy cheap pills".to_string(),
            author_id: Some(42),
            prompt_message_id: prompt,
        }
    }

    #[test]
    fn consensus_requires_distinct_voters() {
        let ledger = VoteLedger::new(2);
        ledger.open((1, 10), context(11));

        // Same voter twice - tally stays at one.
        assert_eq!(
            ledger.cast((1, 10), 100, VotePolarity::Spam),
            CastResult::Counted {
                spam_votes: 1,
                ham_votes: 0
            }
        );
        assert_eq!(
            ledger.cast((1, 10), 100, VotePolarity::Spam),
            CastResult::Counted {
                spam_votes: 1,
                ham_votes: 0
            }
        );

        // A second distinct voter tips it over.
        match ledger.cast((1, 10), 101, VotePolarity::Spam) {
            CastResult::Consensus { polarity, context } => {
                assert_eq!(polarity, VotePolarity::Spam);
                assert_eq!(context.unwrap().prompt_message_id, 11);
            }
            other => panic!("expected consensus, got {:?}", other),
        }
        assert!(!ledger.is_open((1, 10)));
    }

    #[test]
    fn consensus_clears_the_losing_tally_too() {
        let ledger = VoteLedger::new(2);
        ledger.open((1, 10), context(11));

        ledger.cast((1, 10), 100, VotePolarity::Spam);
        ledger.cast((1, 10), 200, VotePolarity::Ham);
        ledger.cast((1, 10), 201, VotePolarity::Ham);

        assert!(!ledger.is_open((1, 10)));
        // A late spam vote starts a fresh ballot rather than resuming the old tally.
        assert_eq!(
            ledger.cast((1, 10), 101, VotePolarity::Spam),
            CastResult::Counted {
                spam_votes: 1,
                ham_votes: 0
            }
        );
    }

    #[test]
    fn first_cast_opens_pending_ballot() {
        let ledger = VoteLedger::new(2);
        assert!(!ledger.is_open((5, 50)));

        ledger.cast((5, 50), 1, VotePolarity::Ham);
        assert!(ledger.is_open((5, 50)));
    }

    #[test]
    fn ballot_without_threshold_stays_pending() {
        let ledger = VoteLedger::new(3);
        ledger.open((2, 20), context(21));
        ledger.cast((2, 20), 1, VotePolarity::Spam);
        ledger.cast((2, 20), 2, VotePolarity::Spam);

        assert!(ledger.is_open((2, 20)));
        assert_eq!(ledger.open_ballots(), 1);
    }
}
