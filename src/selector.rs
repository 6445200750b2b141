use crate::frame::{HandObservation, Handedness};

/// Picks the hand that drives the output.
///
/// The classifier labels hands as seen by a mirrored front camera, so the
/// default control label `Right` is the player's left hand. Labels are not
/// trusted to be unique: when several hands carry the control label, the
/// first one in classifier order wins.
#[derive(Debug, Clone, Copy)]
pub struct HandSelector {
    control_hand: Handedness,
}

impl HandSelector {
    pub fn new(control_hand: Handedness) -> Self {
        Self { control_hand }
    }

    pub fn control_hand(&self) -> Handedness {
        self.control_hand
    }

    pub fn select<'a>(&self, hands: &'a [HandObservation]) -> Option<&'a HandObservation> {
        hands.iter().find(|hand| hand.side == self.control_hand)
    }
}
