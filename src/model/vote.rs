// Majority vote with a deterministic tie rule
//
// Counts are kept in order of first occurrence. On equal counts the label
// seen first wins, so the result never depends on hash ordering.

/// Vote counts in order of first occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct VoteTally<T> {
    counts: Vec<(T, usize)>,
    winner: usize,
}

impl<T> VoteTally<T> {
    /// Most frequent label; earliest first occurrence on ties
    pub fn winner(&self) -> &T {
        &self.counts[self.winner].0
    }

    pub fn into_winner(mut self) -> T {
        self.counts.swap_remove(self.winner).0
    }

    /// `(label, votes)` pairs in order of first occurrence
    pub fn counts(&self) -> &[(T, usize)] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<(T, usize)> {
        self.counts
    }

    /// Total number of votes cast
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// Tally `labels` and pick the majority
///
/// Returns `None` when no labels were given.
pub fn majority_vote<T, I>(labels: I) -> Option<VoteTally<T>>
where
    T: PartialEq,
    I: IntoIterator<Item = T>,
{
    let mut counts: Vec<(T, usize)> = Vec::new();

    for label in labels {
        match counts.iter_mut().find(|(seen, _)| *seen == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }

    if counts.is_empty() {
        return None;
    }

    // Strictly greater keeps the earliest label on ties
    let mut winner = 0;
    for (idx, (_, n)) in counts.iter().enumerate() {
        if *n > counts[winner].1 {
            winner = idx;
        }
    }

    Some(VoteTally { counts, winner })
}
