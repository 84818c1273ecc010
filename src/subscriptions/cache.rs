//! Latest-snapshot cache, one slot per member.

use crate::feed::aggregate::aggregate;
use crate::types::{Aggregate, MemberId, UserSnapshot};

/// One slot per member, in social-graph order.
///
/// Slots are overwritten wholesale. This relies on the source delivering full
/// arrays; a delta-emitting source would need a merge step here instead.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCache {
    members: Vec<MemberId>,
    slots: Vec<Option<UserSnapshot>>,
    revision: u64,
}

impl SnapshotCache {
    pub fn new(members: Vec<MemberId>) -> Self {
        let slots = vec![None; members.len()];
        Self {
            members,
            slots,
            revision: 0,
        }
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    /// Members that have delivered at least one snapshot.
    pub fn reported(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, member: &MemberId) -> Option<&UserSnapshot> {
        let index = self.members.iter().position(|m| m == member)?;
        self.slots[index].as_ref()
    }

    /// Overwrite a member's slot and recombine.
    ///
    /// Returns `None` when `member` is not part of this cache.
    pub fn replace(&mut self, member: &MemberId, snapshot: UserSnapshot) -> Option<Aggregate> {
        if !self.store(member, snapshot) {
            return None;
        }
        Some(self.recombine())
    }

    /// Overwrite a member's slot without recombining. Returns `false` when
    /// `member` is not part of this cache.
    pub fn store(&mut self, member: &MemberId, snapshot: UserSnapshot) -> bool {
        match self.members.iter().position(|m| m == member) {
            Some(index) => {
                self.slots[index] = Some(snapshot);
                true
            }
            None => false,
        }
    }

    /// Rebuild the aggregate from every cached slot.
    pub fn recombine(&mut self) -> Aggregate {
        self.revision += 1;
        Aggregate {
            revision: self.revision,
            entries: aggregate(self.slots.iter().flatten()),
            members_reported: self.reported(),
            members_total: self.members.len(),
        }
    }

    /// Drop every cached snapshot, keeping the member list.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Start over with a new member set.
    pub fn reset(&mut self, members: Vec<MemberId>) {
        self.slots = vec![None; members.len()];
        self.members = members;
        self.revision = 0;
    }
}
