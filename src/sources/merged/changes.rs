// LogWeave - sources/merged/changes.rs
//
// Minimal change set of one merge batch.
//
// Every index mutation within a batch reports the lowest position it
// touched. Rows below that position are unchanged; everything at or above
// it is described to listeners as removed and appended again.

use crate::core::modification::Modification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeChanges {
    initial_count: usize,
    lowest_touched: Option<usize>,
}

impl MergeChanges {
    /// Starts tracking a batch applied to an index of `initial_count` rows.
    pub fn new(initial_count: usize) -> Self {
        Self {
            initial_count,
            lowest_touched: None,
        }
    }

    pub fn touch(&mut self, position: usize) {
        self.lowest_touched = Some(
            self.lowest_touched
                .map_or(position, |lowest| lowest.min(position)),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.lowest_touched.is_none()
    }

    /// The modifications turning the initial index into one of
    /// `final_count` rows. Empty when nothing was touched.
    pub fn into_modifications(self, final_count: usize) -> Vec<Modification> {
        let Some(lowest) = self.lowest_touched else {
            return Vec::new();
        };
        let lowest = lowest.min(self.initial_count);
        let mut modifications = Vec::with_capacity(2);
        if lowest == 0 && self.initial_count > 0 {
            modifications.push(Modification::Reset);
        } else if lowest < self.initial_count {
            modifications.push(Modification::removed(lowest, self.initial_count - lowest));
        }
        if final_count > lowest {
            modifications.push(Modification::appended(lowest, final_count - lowest));
        }
        modifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_batch_yields_nothing() {
        assert!(MergeChanges::new(7).into_modifications(7).is_empty());
    }

    #[test]
    fn test_append_at_end() {
        let mut changes = MergeChanges::new(3);
        changes.touch(3);
        assert_eq!(
            changes.into_modifications(5),
            vec![Modification::appended(3, 2)]
        );
    }

    #[test]
    fn test_insert_in_middle_replaces_tail() {
        let mut changes = MergeChanges::new(4);
        changes.touch(3);
        changes.touch(1);
        assert_eq!(
            changes.into_modifications(6),
            vec![Modification::removed(1, 3), Modification::appended(1, 5)]
        );
    }

    #[test]
    fn test_change_at_front_resets() {
        let mut changes = MergeChanges::new(4);
        changes.touch(0);
        assert_eq!(
            changes.into_modifications(2),
            vec![Modification::Reset, Modification::appended(0, 2)]
        );

        let mut emptied = MergeChanges::new(4);
        emptied.touch(0);
        assert_eq!(emptied.into_modifications(0), vec![Modification::Reset]);
    }

    #[test]
    fn test_first_rows_of_empty_index() {
        let mut changes = MergeChanges::new(0);
        changes.touch(0);
        assert_eq!(
            changes.into_modifications(3),
            vec![Modification::appended(0, 3)]
        );
    }
}
