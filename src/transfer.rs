// 5.0: transfers handed to the collateral ledger. value objects, never mutated
// once returned. the ledger expects every loss before any win.

use crate::mtm::MtmShare;
use crate::position::SettledPosition;
use crate::types::{Amount, PartyId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    MtmWin,
    MtmLoss,
    PerpFundingWin,
    PerpFundingLoss,
    // final settlement at expiry
    Win,
    Loss,
}

impl TransferType {
    pub fn is_loss(&self) -> bool {
        matches!(self, Self::MtmLoss | Self::PerpFundingLoss | Self::Loss)
    }

    pub fn is_win(&self) -> bool {
        !self.is_loss()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub owner: PartyId,
    pub amount: Amount,
    pub asset: String,
    pub transfer_type: TransferType,
}

impl Transfer {
    pub fn new(owner: PartyId, amount: Amount, asset: impl Into<String>, transfer_type: TransferType) -> Self {
        Self {
            owner,
            amount,
            asset: asset.into(),
            transfer_type,
        }
    }
}

/// MTM or funding outcome for one party: the position it was computed from, and the
/// transfer if there is anything to move. `None` is a zero-value placeholder so the
/// ledger still sees every party that was marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtmTransfer {
    pub position: SettledPosition,
    pub transfer: Option<Transfer>,
}

impl MtmTransfer {
    // a zero share carries no transfer
    pub fn from_share(
        position: SettledPosition,
        share: &MtmShare,
        asset: &str,
        win: TransferType,
        loss: TransferType,
    ) -> Self {
        let transfer = (!share.amount.is_zero()).then(|| {
            let transfer_type = if share.is_loss { loss } else { win };
            Transfer::new(position.party.clone(), share.amount, asset, transfer_type)
        });
        Self { position, transfer }
    }

    pub fn party(&self) -> &PartyId {
        &self.position.party
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    pub fn amount(&self) -> Amount {
        self.transfer.as_ref().map(|t| t.amount).unwrap_or(Amount::ZERO)
    }

    pub fn transfer_type(&self) -> Option<TransferType> {
        self.transfer.as_ref().map(|t| t.transfer_type)
    }

    pub fn is_loss(&self) -> bool {
        self.transfer_type().is_some_and(|t| t.is_loss())
    }

    // rounding top-up. a placeholder becomes a real MTM win
    pub(crate) fn credit(&mut self, amount: Amount, asset: &str) {
        if amount.is_zero() {
            return;
        }
        match self.transfer.as_mut() {
            Some(transfer) => transfer.amount = transfer.amount.add(amount),
            None => {
                self.transfer = Some(Transfer::new(
                    self.position.party.clone(),
                    amount,
                    asset,
                    TransferType::MtmWin,
                ))
            }
        }
    }
}

impl MtmTransfer {
    // takes back up to `amount` from a win; returns what was taken
    pub(crate) fn debit(&mut self, amount: Amount) -> Amount {
        let Some(transfer) = self.transfer.as_mut() else {
            return Amount::ZERO;
        };
        let taken = amount.min(transfer.amount);
        transfer.amount = transfer.amount.saturating_sub(taken);
        if transfer.amount.is_zero() {
            self.transfer = None;
        }
        taken
    }
}

/// Sum of losses and wins in a transfer list.
pub fn totals<'a>(transfers: impl IntoIterator<Item = &'a Transfer>) -> (Amount, Amount) {
    transfers
        .into_iter()
        .fold((Amount::ZERO, Amount::ZERO), |(loss, win), t| {
            if t.transfer_type.is_loss() {
                (loss.add(t.amount), win)
            } else {
                (loss, win.add(t.amount))
            }
        })
}
