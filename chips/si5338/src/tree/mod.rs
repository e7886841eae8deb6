// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! The clock tree of the chip.
//!
//! Eighteen nodes, one per clock signal, held in a fixed arena indexed by
//! [`ClockId`]. Each node caches its parent, its rate and, for the PLL and the
//! multisynths, the divider parameters last read from or written to the chip.
//! Nodes are ordered so that a parent always comes before its children, which
//! lets rate propagation walk the arena once from the changed node onwards.
//!
//! Operations dispatch on [`NodeKind`]. Each kind supports a subset of
//! `prepare`, `unprepare`, `enable`, `disable`, `set_parent`, `get_parent`,
//! `set_rate` and `round_rate`; the rest return [`ErrorCode::NOSUPPORT`].
//! `recalc_rate` works on every node.
//!
//! | kind | prepare | enable | parent | rate |
//! |---|---|---|---|---|
//! | Xtal | crystal drive | | | |
//! | Input | | | | |
//! | RefClk, FbClk | | | mux | |
//! | DivRefClk, DivFbClk | pre-divider | | | |
//! | Pll | loop filter | | mux | set/round |
//! | Multisynth | power | | | set/round |
//! | Output | driver power | gate | mux | set/round |
//!
//! Every successful `set_parent` and `set_rate` recomputes the cached rate of
//! the node and all nodes below it.
//!
//! # Usage
//!
//! ```rust,ignore
//! let tree = ClockTree::new(regs, &config)?;
//! tree.set_parent(ClockId::Out0, OutputSource::Ms0 as u8)?;
//! tree.set_rate(ClockId::Out0, 156_250_000)?;
//! tree.prepare(ClockId::Out0)?;
//! tree.enable(ClockId::Out0)?;
//! ```

use core::cell::Cell;

use log::debug;

use crate::config::{Config, FbSource, OutputSource, PllSource, RefSource};
use crate::errorcode::ErrorCode;
use crate::hil::RegisterMap;
use crate::synth::{Adjustment, HwParams};

mod input;
mod multisynth;
mod output;
mod pll;

pub use self::multisynth::{search_master, MasterDivider};
pub use self::output::{closest_r_div, upstream_request};
pub use self::pll::LoopFilter;

const NUM_NODES: usize = 18;

/// One clock signal of the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockId {
    Xtal,
    In12,
    In3,
    In4,
    In56,
    RefClk,
    DivRefClk,
    FbClk,
    DivFbClk,
    Pll,
    Ms0,
    Ms1,
    Ms2,
    Ms3,
    Out0,
    Out1,
    Out2,
    Out3,
}

/// What a node is, and for numbered blocks which one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Xtal,
    /// External input, index into the configured input rates
    Input(usize),
    RefClk,
    DivRefClk,
    FbClk,
    DivFbClk,
    Pll,
    Multisynth(usize),
    Output(usize),
}

impl ClockId {
    /// All nodes, parents before children.
    pub const ALL: [ClockId; NUM_NODES] = [
        ClockId::Xtal,
        ClockId::In12,
        ClockId::In3,
        ClockId::In4,
        ClockId::In56,
        ClockId::RefClk,
        ClockId::DivRefClk,
        ClockId::FbClk,
        ClockId::DivFbClk,
        ClockId::Pll,
        ClockId::Ms0,
        ClockId::Ms1,
        ClockId::Ms2,
        ClockId::Ms3,
        ClockId::Out0,
        ClockId::Out1,
        ClockId::Out2,
        ClockId::Out3,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn multisynth(n: usize) -> Option<ClockId> {
        [ClockId::Ms0, ClockId::Ms1, ClockId::Ms2, ClockId::Ms3]
            .get(n)
            .copied()
    }

    pub fn output(n: usize) -> Option<ClockId> {
        [ClockId::Out0, ClockId::Out1, ClockId::Out2, ClockId::Out3]
            .get(n)
            .copied()
    }

    pub fn kind(self) -> NodeKind {
        match self {
            ClockId::Xtal => NodeKind::Xtal,
            ClockId::In12 => NodeKind::Input(0),
            ClockId::In3 => NodeKind::Input(1),
            ClockId::In4 => NodeKind::Input(2),
            ClockId::In56 => NodeKind::Input(3),
            ClockId::RefClk => NodeKind::RefClk,
            ClockId::DivRefClk => NodeKind::DivRefClk,
            ClockId::FbClk => NodeKind::FbClk,
            ClockId::DivFbClk => NodeKind::DivFbClk,
            ClockId::Pll => NodeKind::Pll,
            ClockId::Ms0 => NodeKind::Multisynth(0),
            ClockId::Ms1 => NodeKind::Multisynth(1),
            ClockId::Ms2 => NodeKind::Multisynth(2),
            ClockId::Ms3 => NodeKind::Multisynth(3),
            ClockId::Out0 => NodeKind::Output(0),
            ClockId::Out1 => NodeKind::Output(1),
            ClockId::Out2 => NodeKind::Output(2),
            ClockId::Out3 => NodeKind::Output(3),
        }
    }

    /// Parent of nodes that are not behind a multiplexer.
    fn fixed_parent(self) -> Option<ClockId> {
        match self.kind() {
            NodeKind::DivRefClk => Some(ClockId::RefClk),
            NodeKind::DivFbClk => Some(ClockId::FbClk),
            NodeKind::Multisynth(_) => Some(ClockId::Pll),
            _ => None,
        }
    }
}

pub(super) fn ms_id(n: usize) -> ClockId {
    ClockId::ALL[ClockId::Ms0.index() + n]
}

pub(super) fn out_id(n: usize) -> ClockId {
    ClockId::ALL[ClockId::Out0.index() + n]
}

/// Cached state of one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockNode {
    pub id: ClockId,
    pub parent: Option<ClockId>,
    /// Last computed rate in Hz
    pub rate: u64,
    /// Divider parameters of the PLL and multisynth nodes
    pub params: Option<HwParams>,
    /// How the last divider programmed by `set_rate` deviates from the request
    pub adjustment: Option<Adjustment>,
    pub prepared: bool,
    pub enabled: bool,
}

impl ClockNode {
    const fn new(id: ClockId) -> Self {
        let params = match id {
            ClockId::Pll | ClockId::Ms0 | ClockId::Ms1 | ClockId::Ms2 | ClockId::Ms3 => {
                Some(HwParams::new(0, 0, 0))
            }
            _ => None,
        };
        Self {
            id,
            parent: None,
            rate: 0,
            params,
            adjustment: None,
            prepared: false,
            enabled: false,
        }
    }
}

/// The clock tree, owning the register map of the chip.
pub struct ClockTree<M: RegisterMap> {
    regs: M,
    nodes: [Cell<ClockNode>; NUM_NODES],
    xtal_rate: u64,
    input_rates: [u64; 4],
    /// Multisynth allowed to retune the PLL
    master: Option<usize>,
}

impl<M: RegisterMap> ClockTree<M> {
    /// Build the tree from the multiplexer settings found in the chip and
    /// compute every rate.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::IO]\): a register could not be read
    /// + [Err]\([ErrorCode::RANGE]\): an external rate is out of range
    pub fn new(regs: M, config: &Config) -> Result<Self, ErrorCode> {
        let tree = Self {
            regs,
            nodes: core::array::from_fn(|i| Cell::new(ClockNode::new(ClockId::ALL[i]))),
            xtal_rate: config.xtal_rate,
            input_rates: config.input_rates,
            master: config.master(),
        };

        for id in ClockId::ALL {
            let parent = match id.fixed_parent() {
                Some(parent) => Some(parent),
                None => match tree.get_parent(id) {
                    Ok(index) => tree.parent_for(id, index).unwrap_or(None),
                    Err(ErrorCode::NOSUPPORT) => None,
                    Err(e) => return Err(e),
                },
            };
            tree.update(id, |node| node.parent = parent);
        }
        for id in ClockId::ALL {
            tree.recalc_rate(id)?;
        }

        Ok(tree)
    }

    pub fn regs(&self) -> &M {
        &self.regs
    }

    pub(crate) fn into_regs(self) -> M {
        self.regs
    }

    /// The multisynth that picks the PLL rate, if any.
    pub fn master(&self) -> Option<usize> {
        self.master
    }

    pub fn node(&self, id: ClockId) -> ClockNode {
        self.nodes[id.index()].get()
    }

    pub fn rate(&self, id: ClockId) -> u64 {
        self.node(id).rate
    }

    pub fn parent(&self, id: ClockId) -> Option<ClockId> {
        self.node(id).parent
    }

    fn update<F: FnOnce(&mut ClockNode)>(&self, id: ClockId, f: F) {
        let cell = &self.nodes[id.index()];
        let mut node = cell.get();
        f(&mut node);
        cell.set(node);
    }

    fn parent_rate(&self, id: ClockId) -> u64 {
        self.parent(id).map_or(0, |parent| self.rate(parent))
    }

    /// Whether `ancestor` is above `id` in the tree.
    fn descends_from(&self, id: ClockId, ancestor: ClockId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Recompute the rate of `from` and of every node below it.
    fn propagate(&self, from: ClockId) -> Result<(), ErrorCode> {
        for id in ClockId::ALL.iter().skip(from.index()) {
            if *id == from || self.descends_from(*id, from) {
                self.recalc_rate(*id)?;
            }
        }
        Ok(())
    }

    /// Map a multiplexer index to the node it selects.
    fn parent_for(&self, id: ClockId, index: u8) -> Result<Option<ClockId>, ErrorCode> {
        let parent = match id.kind() {
            NodeKind::RefClk => match RefSource::try_from(index)? {
                RefSource::In12 => Some(ClockId::In12),
                RefSource::In3 => Some(ClockId::In3),
                RefSource::Xtal => Some(ClockId::Xtal),
            },
            NodeKind::FbClk => match FbSource::try_from(index)? {
                FbSource::In4 => Some(ClockId::In4),
                FbSource::In56 => Some(ClockId::In56),
                FbSource::NoClk => None,
            },
            NodeKind::Pll => match PllSource::try_from(index)? {
                PllSource::RefClk => Some(ClockId::RefClk),
                PllSource::FbClk => Some(ClockId::FbClk),
                PllSource::DivRefClk => Some(ClockId::DivRefClk),
                PllSource::DivFbClk => Some(ClockId::DivFbClk),
                PllSource::Xtal => Some(ClockId::Xtal),
                PllSource::NoClk => None,
            },
            NodeKind::Output(n) => match OutputSource::try_from(index)? {
                OutputSource::FbClk => Some(ClockId::FbClk),
                OutputSource::RefClk => Some(ClockId::RefClk),
                OutputSource::DivFbClk => Some(ClockId::DivFbClk),
                OutputSource::DivRefClk => Some(ClockId::DivRefClk),
                OutputSource::Xtal => Some(ClockId::Xtal),
                OutputSource::Ms0 => Some(ClockId::Ms0),
                OutputSource::MsN => ClockId::multisynth(n),
                OutputSource::NoClk => None,
            },
            _ => return Err(ErrorCode::NOSUPPORT),
        };
        Ok(parent)
    }

    /// Power up the hardware behind `id`, preparing its ancestors first.
    ///
    /// Preparing a prepared node does nothing.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::RANGE]\): the crystal rate is out of range, or the
    /// PLL has no input or output rate
    /// + [Err]\([ErrorCode::IO]\): a register write failed
    pub fn prepare(&self, id: ClockId) -> Result<(), ErrorCode> {
        let node = self.node(id);
        if node.prepared {
            return Ok(());
        }
        if let Some(parent) = node.parent {
            self.prepare(parent)?;
        }

        match id.kind() {
            NodeKind::Xtal => self.xtal_prepare()?,
            NodeKind::DivRefClk => self.pdiv_prepare(ClockId::DivRefClk)?,
            NodeKind::DivFbClk => self.pdiv_prepare(ClockId::DivFbClk)?,
            NodeKind::Pll => self.pll_prepare()?,
            NodeKind::Multisynth(n) => self.ms_power(n, true)?,
            NodeKind::Output(n) => self.output_power(n, true)?,
            NodeKind::Input(_) | NodeKind::RefClk | NodeKind::FbClk => {}
        }

        debug!("Si5338: prepared {:?}", id);
        self.update(id, |node| node.prepared = true);
        Ok(())
    }

    /// Power down the hardware behind `id`. An enabled output is disabled
    /// first. Ancestors are left alone.
    pub fn unprepare(&self, id: ClockId) -> Result<(), ErrorCode> {
        match id.kind() {
            NodeKind::Multisynth(n) => self.ms_power(n, false)?,
            NodeKind::Output(n) => {
                if self.node(id).enabled {
                    self.disable(id)?;
                }
                self.output_power(n, false)?;
            }
            _ => {}
        }

        self.update(id, |node| node.prepared = false);
        Ok(())
    }

    /// Open the output gate.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::NOSUPPORT]\): `id` is not an output
    /// + [Err]\([ErrorCode::OFF]\): the output is not prepared
    pub fn enable(&self, id: ClockId) -> Result<(), ErrorCode> {
        let NodeKind::Output(n) = id.kind() else {
            return Err(ErrorCode::NOSUPPORT);
        };
        if !self.node(id).prepared {
            return Err(ErrorCode::OFF);
        }
        self.output_gate(n, true)?;
        self.update(id, |node| node.enabled = true);
        Ok(())
    }

    /// Close the output gate. The driver stays powered.
    pub fn disable(&self, id: ClockId) -> Result<(), ErrorCode> {
        let NodeKind::Output(n) = id.kind() else {
            return Err(ErrorCode::NOSUPPORT);
        };
        self.output_gate(n, false)?;
        self.update(id, |node| node.enabled = false);
        Ok(())
    }

    /// Select input `index` of the multiplexer in front of `id`.
    ///
    /// The index values are those of [`RefSource`], [`FbSource`],
    /// [`PllSource`] and [`OutputSource`].
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::NOSUPPORT]\): `id` has no multiplexer
    /// + [Err]\([ErrorCode::INVALID_SELECTOR]\): `index` is not a valid input
    pub fn set_parent(&self, id: ClockId, index: u8) -> Result<(), ErrorCode> {
        let parent = self.parent_for(id, index)?;

        match id.kind() {
            NodeKind::RefClk => self.refclk_select(index)?,
            NodeKind::FbClk => self.fbclk_select(index)?,
            NodeKind::Pll => {
                self.invalidate_params(id);
                self.pll_select(index)?;
            }
            NodeKind::Output(n) => self.output_select(n, index)?,
            _ => return Err(ErrorCode::NOSUPPORT),
        }

        self.update(id, |node| node.parent = parent);
        self.propagate(id)
    }

    /// The multiplexer index currently programmed in the chip.
    ///
    /// The value is returned as read, even if it does not name a valid input.
    pub fn get_parent(&self, id: ClockId) -> Result<u8, ErrorCode> {
        match id.kind() {
            NodeKind::RefClk => self.refclk_selected(),
            NodeKind::FbClk => self.fbclk_selected(),
            NodeKind::Pll => self.pll_selected(),
            NodeKind::Output(n) => self.output_selected(n),
            _ => Err(ErrorCode::NOSUPPORT),
        }
    }

    /// Recompute and cache the rate of `id` from the cached parent rate.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::RANGE]\): `id` is an input with an out of range rate
    /// + [Err]\([ErrorCode::IO]\): divider parameters could not be read
    pub fn recalc_rate(&self, id: ClockId) -> Result<u64, ErrorCode> {
        let parent_rate = self.parent_rate(id);
        let rate = match id.kind() {
            NodeKind::Xtal => self.xtal_rate,
            NodeKind::Input(i) => self.input_recalc(i)?,
            NodeKind::RefClk | NodeKind::FbClk => parent_rate,
            NodeKind::DivRefClk | NodeKind::DivFbClk => {
                parent_rate >> input::pdiv_shift(parent_rate)
            }
            NodeKind::Pll => self.pll_recalc(parent_rate)?,
            NodeKind::Multisynth(n) => self.ms_recalc(n, parent_rate)?,
            NodeKind::Output(n) => self.output_recalc(n, parent_rate)?,
        };

        self.update(id, |node| node.rate = rate);
        Ok(rate)
    }

    /// The rate `set_rate(id, rate)` would produce. Nothing is written.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::NOSUPPORT]\): the rate of `id` can not be set
    /// + [Err]\([ErrorCode::RANGE]\): the node has no input clock
    pub fn round_rate(&self, id: ClockId, rate: u64) -> Result<u64, ErrorCode> {
        match id.kind() {
            NodeKind::Pll => self.pll_round_rate(rate),
            NodeKind::Multisynth(n) => self.ms_round_rate(n, rate),
            NodeKind::Output(n) => self.output_round_rate(n, rate),
            _ => Err(ErrorCode::NOSUPPORT),
        }
    }

    /// Program `id` for the closest rate to `rate` it can reach.
    ///
    /// For an output fed by a multisynth this retunes the multisynth, and for
    /// the master multisynth also the PLL.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::NOSUPPORT]\): the rate of `id` can not be set
    /// + [Err]\([ErrorCode::RANGE]\): the node has no input clock
    /// + [Err]\([ErrorCode::IO]\): a register write failed; the divider
    /// parameters are then left marked invalid
    pub fn set_rate(&self, id: ClockId, rate: u64) -> Result<(), ErrorCode> {
        match id.kind() {
            NodeKind::Pll => self.pll_set_rate(rate),
            NodeKind::Multisynth(n) => self.ms_set_rate(n, rate),
            NodeKind::Output(n) => self.output_set_rate(n, rate),
            _ => Err(ErrorCode::NOSUPPORT),
        }
    }

    fn invalidate_params(&self, id: ClockId) {
        self.update(id, |node| {
            if let Some(params) = node.params.as_mut() {
                params.valid = false;
            }
        });
    }
}
