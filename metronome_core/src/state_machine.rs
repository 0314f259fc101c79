// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pipeline decision table.
//!
//! [`PipelineStateMachine`] holds every sticky intent (needs-redraw,
//! needs-producer-work, visibility, sink state, ...) and the phases of the
//! current tick and producer round. Given that state, [`next_action`] returns
//! the single most important thing to do next. It never reads a clock and
//! never executes anything; the [`Scheduler`](crate::scheduler::Scheduler)
//! drives it through time and performs the actions it asks for.
//!
//! # Protocol
//!
//! For every action other than [`Action::None`], the executor calls the
//! matching `will_*` method, performs the action, then closes the pair with
//! [`did_draw`] for draws or [`did_perform`] for everything else. Calls that
//! break the pairing are caught by `debug_assert!` and ignored in release
//! builds.
//!
//! Each tick moves through [`on_tick_begin`], optionally [`on_tick_deadline`],
//! and [`on_tick_idle`], in that order.
//!
//! # Draw timing
//!
//! At most one draw is attempted per tick. Before the deadline a draw is
//! issued as [`Action::DrawIfPossible`] only when waiting longer cannot
//! improve the frame. Once the deadline has passed, a draw that is still due
//! is issued as [`Action::DrawForced`]. A failed draw is never retried in the
//! same tick.
//!
//! [`next_action`]: PipelineStateMachine::next_action
//! [`did_draw`]: PipelineStateMachine::did_draw
//! [`did_perform`]: PipelineStateMachine::did_perform
//! [`on_tick_begin`]: PipelineStateMachine::on_tick_begin
//! [`on_tick_deadline`]: PipelineStateMachine::on_tick_deadline
//! [`on_tick_idle`]: PipelineStateMachine::on_tick_idle

use core::fmt;

use crate::settings::SchedulerSettings;
use crate::timing::CommitEarlyOutReason;

/// Submitted frames allowed in flight before draws are throttled.
pub const MAX_PENDING_SUBMIT_FRAMES: u32 = 1;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The single next step the executor should take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing to do until some input changes.
    None,
    /// Dispatch a round of producer work.
    SendProducerWork,
    /// Tell the producer that no work is coming this tick.
    NotifyProducerWorkNotSent,
    /// Hand the producer's finished work to the pending tree.
    Commit,
    /// Make the pending tree the active tree.
    ActivateSyncTree,
    /// Create a pending tree from impl-side changes only.
    PerformImplSideInvalidation,
    /// Draw if the content is good enough; the draw may fail.
    DrawIfPossible,
    /// Draw whatever is available.
    DrawForced,
    /// Drop a pending draw to keep the pipeline moving.
    DrawAbort,
    /// Start creating a new output sink.
    BeginSinkCreation,
    /// Prepare auxiliary work (tiles) for the next frames.
    PrepareTiles,
    /// Ask the embedder to request a draw (synchronous mode).
    InvalidateSink,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::None,
        Self::SendProducerWork,
        Self::NotifyProducerWorkNotSent,
        Self::Commit,
        Self::ActivateSyncTree,
        Self::PerformImplSideInvalidation,
        Self::DrawIfPossible,
        Self::DrawForced,
        Self::DrawAbort,
        Self::BeginSinkCreation,
        Self::PrepareTiles,
        Self::InvalidateSink,
    ];

    /// Stable, human-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SendProducerWork => "send_producer_work",
            Self::NotifyProducerWorkNotSent => "notify_producer_work_not_sent",
            Self::Commit => "commit",
            Self::ActivateSyncTree => "activate_sync_tree",
            Self::PerformImplSideInvalidation => "perform_impl_side_invalidation",
            Self::DrawIfPossible => "draw_if_possible",
            Self::DrawForced => "draw_forced",
            Self::DrawAbort => "draw_abort",
            Self::BeginSinkCreation => "begin_sink_creation",
            Self::PrepareTiles => "prepare_tiles",
            Self::InvalidateSink => "invalidate_sink",
        }
    }

    /// Whether this is one of the three draw actions.
    #[must_use]
    pub const fn is_draw(self) -> bool {
        matches!(self, Self::DrawIfPossible | Self::DrawForced | Self::DrawAbort)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current tick is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// Between ticks.
    Idle,
    /// A pulse has begun and its deadline has not passed.
    InsidePulse,
    /// The deadline has passed; only cleanup and last-chance draws remain.
    InsideDeadline,
}

/// Progress of the outstanding producer round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProducerWorkPhase {
    /// No round outstanding.
    Idle,
    /// Dispatched but not yet picked up.
    Sent,
    /// The producer is running.
    Started,
    /// The producer finished and is waiting for the commit.
    ReadyToCommit,
}

/// Lifecycle of the output sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SinkState {
    /// No sink; one must be created.
    None,
    /// Creation requested; waiting for the client.
    Creating,
    /// Created; the first commit has not arrived.
    WaitingForFirstCommit,
    /// The first commit arrived; waiting for it to activate.
    WaitingForFirstActivation,
    /// Fully operational.
    Active,
}

/// Progress of a redraw forced by repeated draw failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForcedRedrawState {
    /// No forced redraw in progress.
    Idle,
    /// Waiting for fresh content to be committed.
    WaitingForCommit,
    /// Waiting for the committed content to activate.
    WaitingForActivation,
    /// The next draw will be forced.
    WaitingForDraw,
}

/// How the scheduler should arm the deadline timer for the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeadlineMode {
    /// No deadline this tick.
    None,
    /// Fire as soon as possible.
    Immediate,
    /// Fire at the pulse's (adjusted) deadline.
    Regular,
    /// Fire at the next pulse boundary.
    Late,
    /// Do not arm; a later notification will re-evaluate.
    Blocked,
}

impl DeadlineMode {
    /// Stable, human-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Immediate => "immediate",
            Self::Regular => "regular",
            Self::Late => "late",
            Self::Blocked => "blocked",
        }
    }
}

/// Outcome of a draw reported by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawResult {
    /// A frame was drawn and submitted downstream.
    Success,
    /// Animated content was not rasterized in time.
    AbortedCheckerboardAnimations,
    /// High-resolution content required by the frame is missing.
    AbortedMissingHighResContent,
    /// Nothing could be drawn to.
    AbortedCantDraw,
    /// The draw was dropped to drain the pipeline.
    AbortedDrainingPipeline,
}

impl DrawResult {
    /// Whether the draw produced a frame.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Which tree the producer and the draw stage should favour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TreePriority {
    /// Balanced.
    #[default]
    SamePriorityForBothTrees,
    /// Favour smooth impl-side updates (e.g. during a scroll).
    SmoothnessTakesPriority,
    /// Favour fresh producer content.
    NewContentTakesPriority,
}

/// Whether an active scroll is observed by the producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScrollHandlerState {
    /// The producer listens to scrolls and must stay in sync.
    AffectsScrollHandler,
    /// Scrolling is handled entirely on the impl side.
    #[default]
    DoesNotAffectScrollHandler,
}

/// Plain copy of the machine's state, for logging and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Current tick phase.
    pub tick_phase: TickPhase,
    /// Current producer phase.
    pub producer_phase: ProducerWorkPhase,
    /// Current sink state.
    pub sink_state: SinkState,
    /// Forced redraw progress.
    pub forced_redraw_state: ForcedRedrawState,
    /// Ticks begun so far.
    pub frame_number: u64,
    /// A redraw is pending.
    pub needs_redraw: bool,
    /// Producer work is pending.
    pub needs_producer_work: bool,
    /// One more tick was requested.
    pub needs_one_more_tick: bool,
    /// An impl-side invalidation is pending.
    pub needs_impl_side_invalidation: bool,
    /// Tile preparation is pending.
    pub needs_prepare_tiles: bool,
    /// A pending tree exists.
    pub has_pending_tree: bool,
    /// The active tree has not been drawn since activation.
    pub active_tree_needs_first_draw: bool,
    /// Submitted frames without an acknowledgement.
    pub pending_submit_frames: u32,
    /// The surface is visible.
    pub visible: bool,
    /// An output target exists.
    pub can_draw: bool,
    /// Commits are deferred.
    pub defer_commits: bool,
    /// The tick source is paused.
    pub tick_source_paused: bool,
    /// The producer missed the previous deadline.
    pub producer_missed_last_deadline: bool,
    /// Producer work is skipped for the current tick.
    pub skip_next_producer_work: bool,
}

// ---------------------------------------------------------------------------
// PipelineStateMachine
// ---------------------------------------------------------------------------

/// Decides what the pipeline should do next.
///
/// See the [module documentation](self) for the calling protocol.
#[derive(Clone, Debug)]
pub struct PipelineStateMachine {
    settings: SchedulerSettings,

    tick_phase: TickPhase,
    producer_phase: ProducerWorkPhase,
    sink_state: SinkState,
    forced_redraw_state: ForcedRedrawState,
    in_flight: Option<Action>,

    source_id: u64,
    sequence_number: u64,
    frame_number: u64,

    // Sticky intents.
    needs_redraw: bool,
    needs_producer_work: bool,
    needs_one_more_tick: bool,
    needs_impl_side_invalidation: bool,
    next_invalidation_needs_first_draw: bool,
    needs_prepare_tiles: bool,
    can_draw: bool,
    visible: bool,
    defer_commits: bool,
    video_needs_ticks: bool,
    tick_source_paused: bool,
    resourceless_software_draw: bool,
    wants_producer_not_expected_messages: bool,
    tree_priority: TreePriority,
    scroll_handler_state: ScrollHandlerState,

    // Trees.
    has_pending_tree: bool,
    pending_tree_is_ready_for_activation: bool,
    pending_tree_is_impl_side: bool,
    pending_tree_needs_first_draw: bool,
    active_tree_needs_first_draw: bool,
    active_tree_is_ready_to_draw: bool,

    // Once-per-tick funnels.
    did_draw_this_tick: bool,
    did_submit_this_tick: bool,
    did_send_producer_work_this_tick: bool,
    did_notify_not_sent_this_tick: bool,
    did_invalidate_sink_this_tick: bool,
    did_perform_invalidation_this_tick: bool,
    did_prepare_tiles_this_tick: bool,

    pending_submit_frames: u32,
    consecutive_checkerboard_draws: u32,
    producer_missed_last_deadline: bool,
    skip_next_producer_work: bool,
    critical_producer_to_activate_is_fast: bool,
    last_commit_had_no_updates: bool,
}

impl PipelineStateMachine {
    /// Creates a machine with no sink, invisible, and unable to draw.
    #[must_use]
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            tick_phase: TickPhase::Idle,
            producer_phase: ProducerWorkPhase::Idle,
            sink_state: SinkState::None,
            forced_redraw_state: ForcedRedrawState::Idle,
            in_flight: None,
            source_id: 0,
            sequence_number: 0,
            frame_number: 0,
            needs_redraw: false,
            needs_producer_work: false,
            needs_one_more_tick: false,
            needs_impl_side_invalidation: false,
            next_invalidation_needs_first_draw: false,
            needs_prepare_tiles: false,
            can_draw: false,
            visible: false,
            defer_commits: false,
            video_needs_ticks: false,
            tick_source_paused: false,
            resourceless_software_draw: false,
            wants_producer_not_expected_messages: false,
            tree_priority: TreePriority::default(),
            scroll_handler_state: ScrollHandlerState::default(),
            has_pending_tree: false,
            pending_tree_is_ready_for_activation: false,
            pending_tree_is_impl_side: false,
            pending_tree_needs_first_draw: false,
            active_tree_needs_first_draw: false,
            active_tree_is_ready_to_draw: true,
            did_draw_this_tick: false,
            did_submit_this_tick: false,
            did_send_producer_work_this_tick: false,
            did_notify_not_sent_this_tick: false,
            did_invalidate_sink_this_tick: false,
            did_perform_invalidation_this_tick: false,
            did_prepare_tiles_this_tick: false,
            pending_submit_frames: 0,
            consecutive_checkerboard_draws: 0,
            producer_missed_last_deadline: false,
            skip_next_producer_work: false,
            critical_producer_to_activate_is_fast: false,
            last_commit_had_no_updates: false,
        }
    }

    // -- Decision -----------------------------------------------------------

    /// Returns the single next action.
    ///
    /// Pure: repeated calls without an intervening mutation return the same
    /// action.
    #[must_use]
    pub fn next_action(&self) -> Action {
        if self.should_begin_sink_creation() {
            return Action::BeginSinkCreation;
        }
        if self.should_perform_impl_side_invalidation() {
            return Action::PerformImplSideInvalidation;
        }
        if let Some(draw) = self.draw_action() {
            return draw;
        }
        if self.should_commit() {
            return Action::Commit;
        }
        if self.should_activate_sync_tree() {
            return Action::ActivateSyncTree;
        }
        if self.should_send_producer_work() {
            return Action::SendProducerWork;
        }
        if self.should_notify_producer_work_not_sent() {
            return Action::NotifyProducerWorkNotSent;
        }
        if self.should_prepare_tiles() {
            return Action::PrepareTiles;
        }
        if self.should_invalidate_sink() {
            return Action::InvalidateSink;
        }
        Action::None
    }

    /// Whether the scheduler should keep observing the tick source.
    #[must_use]
    pub fn tick_needed(&self) -> bool {
        if !self.has_initialized_sink() || !self.visible {
            return false;
        }
        self.tick_required_for_action() || self.video_needs_ticks || self.proactive_tick_wanted()
    }

    /// How the deadline timer should be armed for the current tick.
    #[must_use]
    pub fn current_deadline_mode(&self) -> DeadlineMode {
        if self.settings.using_synchronous_tick_source {
            DeadlineMode::None
        } else if self.should_finish_tick_immediately() {
            DeadlineMode::Immediate
        } else if self.should_block_deadline_indefinitely() {
            DeadlineMode::Blocked
        } else if self.needs_redraw {
            DeadlineMode::Regular
        } else {
            DeadlineMode::Late
        }
    }

    fn tick_required_for_action(&self) -> bool {
        if self.forced_redraw_state == ForcedRedrawState::WaitingForDraw {
            return true;
        }
        self.needs_redraw
            || self.needs_one_more_tick
            || (self.needs_producer_work && !self.defer_commits)
            || self.needs_impl_side_invalidation
    }

    fn proactive_tick_wanted(&self) -> bool {
        // A round in flight may finish quickly and want to be drawn.
        if self.producer_phase != ProducerWorkPhase::Idle && !self.defer_commits {
            return true;
        }
        if self.active_tree_needs_first_draw || self.has_pending_tree {
            return true;
        }
        self.needs_prepare_tiles || self.did_submit_this_tick || self.last_commit_had_no_updates
    }

    fn should_begin_sink_creation(&self) -> bool {
        if !self.visible || self.sink_state != SinkState::None {
            return false;
        }
        // The pipeline must be drained before a new sink is created.
        self.producer_phase == ProducerWorkPhase::Idle
            && self.tick_phase == TickPhase::Idle
            && !self.active_tree_needs_first_draw
            && !self.has_pending_tree
    }

    fn could_create_pending_tree(&self) -> bool {
        !self.has_pending_tree
            && self.visible
            && !self.tick_source_paused
            && self.sink_state == SinkState::Active
    }

    fn should_perform_impl_side_invalidation(&self) -> bool {
        if !self.needs_impl_side_invalidation || !self.could_create_pending_tree() {
            return false;
        }
        // A commit about to land absorbs the invalidation.
        if self.producer_phase == ProducerWorkPhase::ReadyToCommit {
            return false;
        }
        if self.did_perform_invalidation_this_tick || self.tick_phase != TickPhase::InsideDeadline {
            return false;
        }
        self.draw_action().is_none()
    }

    fn draw_due(&self) -> bool {
        self.needs_redraw
            || self.active_tree_needs_first_draw
            || self.forced_redraw_state == ForcedRedrawState::WaitingForDraw
    }

    fn draw_action(&self) -> Option<Action> {
        if self.pending_draws_should_be_aborted() {
            // Only an undrawn active tree blocks progress; drop it.
            return self.active_tree_needs_first_draw.then_some(Action::DrawAbort);
        }
        if self.did_draw_this_tick
            || self.sink_state != SinkState::Active
            || self.is_draw_throttled()
            || !self.draw_due()
        {
            return None;
        }
        match self.tick_phase {
            TickPhase::Idle => None,
            TickPhase::InsidePulse => {
                if self.settings.using_synchronous_tick_source {
                    // Synchronous embedders request draws explicitly.
                    None
                } else if self.forced_redraw_state == ForcedRedrawState::WaitingForDraw {
                    Some(Action::DrawForced)
                } else if self.draw_ready_now() {
                    Some(Action::DrawIfPossible)
                } else {
                    None
                }
            }
            TickPhase::InsideDeadline => {
                // Let ready content land before the last-chance draw.
                (!self.should_commit() && !self.should_activate_sync_tree())
                    .then_some(Action::DrawForced)
            }
        }
    }

    /// Whether drawing before the deadline would not lose anything worth
    /// waiting for.
    fn draw_ready_now(&self) -> bool {
        if self.settings.wait_for_all_pipeline_stages_before_draw {
            return !self.should_block_deadline_indefinitely();
        }
        if self.active_tree_needs_first_draw {
            return true;
        }
        if !self.needs_redraw {
            return false;
        }
        if self.impl_latency_takes_priority() {
            return true;
        }
        self.producer_phase == ProducerWorkPhase::Idle
            && !self.has_pending_tree
            && !self.should_send_producer_work()
    }

    fn should_commit(&self) -> bool {
        self.producer_phase == ProducerWorkPhase::ReadyToCommit
            && !self.has_pending_tree
            && !self.defer_commits
    }

    fn should_activate_sync_tree(&self) -> bool {
        if !self.has_pending_tree || self.active_tree_needs_first_draw {
            return false;
        }
        self.pending_activations_should_be_forced() || self.pending_tree_is_ready_for_activation
    }

    fn could_send_producer_work(&self) -> bool {
        self.needs_producer_work && self.visible && !self.tick_source_paused && !self.defer_commits
    }

    fn should_send_producer_work(&self) -> bool {
        if !self.could_send_producer_work() {
            return false;
        }
        if self.did_send_producer_work_this_tick
            || self.producer_phase != ProducerWorkPhase::Idle
            || self.has_pending_tree
        {
            return false;
        }
        if self.impl_latency_takes_priority() && self.active_tree_needs_first_draw {
            return false;
        }
        let phase_allows = match self.tick_phase {
            TickPhase::InsidePulse => true,
            // Synchronous embedders have no input latency to wait for.
            TickPhase::Idle => self.settings.using_synchronous_tick_source,
            TickPhase::InsideDeadline => false,
        };
        if !phase_allows {
            return false;
        }
        if self.forced_redraw_state == ForcedRedrawState::WaitingForCommit {
            return true;
        }
        if !self.has_initialized_sink() {
            return false;
        }
        if !self.settings.producer_work_while_throttled
            && self.is_draw_throttled()
            && !self.did_submit_this_tick
        {
            return false;
        }
        !self.skip_next_producer_work
    }

    fn should_notify_producer_work_not_sent(&self) -> bool {
        if self.did_notify_not_sent_this_tick
            || self.did_send_producer_work_this_tick
            || self.tick_phase == TickPhase::Idle
        {
            return false;
        }
        if !self.visible || self.tick_source_paused || self.defer_commits {
            return false;
        }
        if self.producer_phase != ProducerWorkPhase::Idle {
            return false;
        }
        if self.skip_next_producer_work {
            return self.could_send_producer_work() && self.has_initialized_sink();
        }
        if self.needs_producer_work || self.has_pending_tree || self.active_tree_needs_first_draw {
            return false;
        }
        self.wants_producer_not_expected_messages
    }

    fn should_prepare_tiles(&self) -> bool {
        if !self.needs_prepare_tiles {
            return false;
        }
        if self.settings.wait_for_all_pipeline_stages_before_draw {
            return true;
        }
        !self.did_prepare_tiles_this_tick && self.tick_phase == TickPhase::InsideDeadline
    }

    fn should_invalidate_sink(&self) -> bool {
        if !self.settings.using_synchronous_tick_source
            || self.did_invalidate_sink_this_tick
            || self.tick_phase != TickPhase::InsidePulse
        {
            return false;
        }
        (self.needs_redraw && !self.pending_draws_should_be_aborted()) || self.needs_prepare_tiles
    }

    fn should_finish_tick_immediately(&self) -> bool {
        if self.pending_activations_should_be_forced() && !self.has_pending_tree {
            return true;
        }
        if self.did_draw_this_tick {
            return true;
        }
        if self.is_draw_throttled() {
            return false;
        }
        self.draw_due() && self.draw_ready_now()
    }

    fn should_block_deadline_indefinitely(&self) -> bool {
        if !self.settings.wait_for_all_pipeline_stages_before_draw {
            return false;
        }
        if self.sink_state == SinkState::None || !self.visible || self.tick_source_paused {
            return false;
        }
        if self.should_send_producer_work()
            || self.producer_phase != ProducerWorkPhase::Idle
            || self.has_pending_tree
        {
            return true;
        }
        self.can_draw && !self.active_tree_is_ready_to_draw
    }

    // -- Derived queries ----------------------------------------------------

    /// Whether pending draws should be dropped rather than performed.
    #[must_use]
    pub fn pending_draws_should_be_aborted(&self) -> bool {
        let sink_lost = self.sink_state == SinkState::None;
        if self.resourceless_software_draw {
            return sink_lost || !self.can_draw;
        }
        sink_lost || !self.can_draw || !self.visible || self.tick_source_paused
    }

    /// Whether a pending tree should activate without waiting to be ready.
    #[must_use]
    pub fn pending_activations_should_be_forced(&self) -> bool {
        self.sink_state == SinkState::None || !self.visible || self.tick_source_paused
    }

    /// Whether impl-side latency currently outranks producer throughput.
    #[must_use]
    pub fn impl_latency_takes_priority(&self) -> bool {
        // A producer that handles scrolls quickly should stay in sync.
        if self.critical_producer_to_activate_is_fast
            && self.scroll_handler_state == ScrollHandlerState::AffectsScrollHandler
        {
            return false;
        }
        self.tree_priority == TreePriority::SmoothnessTakesPriority
    }

    /// Whether the only pending updates are impl-side.
    #[must_use]
    pub fn only_impl_side_updates_expected(&self) -> bool {
        let has_impl_updates = self.needs_redraw || self.needs_one_more_tick;
        let producer_updates_expected = self.needs_producer_work
            || self.producer_phase != ProducerWorkPhase::Idle
            || self.has_pending_tree;
        has_impl_updates && !producer_updates_expected
    }

    /// Whether too many submitted frames are waiting for acknowledgement.
    #[must_use]
    pub fn is_draw_throttled(&self) -> bool {
        self.pending_submit_frames >= MAX_PENDING_SUBMIT_FRAMES
    }

    /// Whether a sink exists and has been initialized.
    #[must_use]
    pub fn has_initialized_sink(&self) -> bool {
        matches!(
            self.sink_state,
            SinkState::WaitingForFirstCommit
                | SinkState::WaitingForFirstActivation
                | SinkState::Active
        )
    }

    /// Whether producer work is sent, started, or waiting to commit.
    #[must_use]
    pub fn commit_pending(&self) -> bool {
        self.producer_phase != ProducerWorkPhase::Idle
    }

    // -- Accessors ----------------------------------------------------------

    /// The current tick phase.
    #[must_use]
    pub fn tick_phase(&self) -> TickPhase {
        self.tick_phase
    }

    /// The current producer phase.
    #[must_use]
    pub fn producer_phase(&self) -> ProducerWorkPhase {
        self.producer_phase
    }

    /// The current sink state.
    #[must_use]
    pub fn sink_state(&self) -> SinkState {
        self.sink_state
    }

    /// Forced redraw progress.
    #[must_use]
    pub fn forced_redraw_state(&self) -> ForcedRedrawState {
        self.forced_redraw_state
    }

    /// A redraw is pending.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Producer work is pending.
    #[must_use]
    pub fn needs_producer_work(&self) -> bool {
        self.needs_producer_work
    }

    /// An impl-side invalidation is pending.
    #[must_use]
    pub fn needs_impl_side_invalidation(&self) -> bool {
        self.needs_impl_side_invalidation
    }

    /// The active tree has not been drawn since it activated.
    #[must_use]
    pub fn active_tree_needs_first_draw(&self) -> bool {
        self.active_tree_needs_first_draw
    }

    /// A pending tree exists.
    #[must_use]
    pub fn has_pending_tree(&self) -> bool {
        self.has_pending_tree
    }

    /// Submitted frames without an acknowledgement.
    #[must_use]
    pub fn pending_submit_frames(&self) -> u32 {
        self.pending_submit_frames
    }

    /// The surface is visible.
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// The tick source is paused.
    #[must_use]
    pub fn tick_source_paused(&self) -> bool {
        self.tick_source_paused
    }

    /// A frame was submitted during the current (or just finished) tick.
    #[must_use]
    pub fn did_submit_this_tick(&self) -> bool {
        self.did_submit_this_tick
    }

    /// The producer had work outstanding when the previous tick ended.
    #[must_use]
    pub fn producer_missed_last_deadline(&self) -> bool {
        self.producer_missed_last_deadline
    }

    /// Producer work is skipped for the current tick.
    #[must_use]
    pub fn skip_next_producer_work(&self) -> bool {
        self.skip_next_producer_work
    }

    /// The producer opted in to "no work expected" notifications.
    #[must_use]
    pub fn wants_producer_not_expected_messages(&self) -> bool {
        self.wants_producer_not_expected_messages
    }

    /// Ticks begun so far.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Source and sequence number of the current (or last) tick.
    #[must_use]
    pub fn current_tick_id(&self) -> (u64, u64) {
        (self.source_id, self.sequence_number)
    }

    /// Plain copy of the state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            tick_phase: self.tick_phase,
            producer_phase: self.producer_phase,
            sink_state: self.sink_state,
            forced_redraw_state: self.forced_redraw_state,
            frame_number: self.frame_number,
            needs_redraw: self.needs_redraw,
            needs_producer_work: self.needs_producer_work,
            needs_one_more_tick: self.needs_one_more_tick,
            needs_impl_side_invalidation: self.needs_impl_side_invalidation,
            needs_prepare_tiles: self.needs_prepare_tiles,
            has_pending_tree: self.has_pending_tree,
            active_tree_needs_first_draw: self.active_tree_needs_first_draw,
            pending_submit_frames: self.pending_submit_frames,
            visible: self.visible,
            can_draw: self.can_draw,
            defer_commits: self.defer_commits,
            tick_source_paused: self.tick_source_paused,
            producer_missed_last_deadline: self.producer_missed_last_deadline,
            skip_next_producer_work: self.skip_next_producer_work,
        }
    }

    // -- Intents ------------------------------------------------------------

    /// Requests a redraw.
    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Requests a round of producer work.
    pub fn set_needs_producer_work(&mut self) {
        self.needs_producer_work = true;
    }

    /// Requests one more tick even if nothing else needs it.
    pub fn set_needs_one_more_tick(&mut self) {
        self.needs_one_more_tick = true;
    }

    /// Requests tile preparation.
    pub fn set_needs_prepare_tiles(&mut self) {
        self.needs_prepare_tiles = true;
    }

    /// Requests an impl-side invalidation.
    ///
    /// When `needs_first_draw_on_activation` is set, the resulting tree
    /// blocks further activations until drawn.
    pub fn set_needs_impl_side_invalidation(&mut self, needs_first_draw_on_activation: bool) {
        self.needs_impl_side_invalidation = true;
        self.next_invalidation_needs_first_draw |= needs_first_draw_on_activation;
    }

    /// Defers (or resumes) producer work and commits.
    pub fn set_defer_commits(&mut self, defer: bool) {
        self.defer_commits = defer;
    }

    /// Sets visibility.
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        if !visible {
            self.producer_missed_last_deadline = false;
        }
    }

    /// Sets whether an output target exists.
    pub fn set_can_draw(&mut self, can_draw: bool) {
        self.can_draw = can_draw;
    }

    /// Marks the tick source as paused or resumed.
    pub fn set_tick_source_paused(&mut self, paused: bool) {
        self.tick_source_paused = paused;
    }

    /// Keeps ticks coming for video playback.
    pub fn set_video_needs_ticks(&mut self, needs: bool) {
        self.video_needs_ticks = needs;
    }

    /// Allows draws while invisible (synchronous software draws).
    pub fn set_resourceless_software_draw(&mut self, resourceless: bool) {
        self.resourceless_software_draw = resourceless;
    }

    /// Sets tree priority and scroll ownership.
    pub fn set_tree_priorities_and_scroll_state(
        &mut self,
        tree_priority: TreePriority,
        scroll_handler_state: ScrollHandlerState,
    ) {
        self.tree_priority = tree_priority;
        self.scroll_handler_state = scroll_handler_state;
    }

    /// Opts the producer in or out of "no work expected" notifications.
    pub fn set_wants_producer_not_expected_messages(&mut self, wants: bool) {
        self.wants_producer_not_expected_messages = wants;
    }

    /// Records whether the critical producer-to-activation path fits in a
    /// tick interval.
    pub fn set_critical_producer_to_activate_is_fast(&mut self, is_fast: bool) {
        self.critical_producer_to_activate_is_fast = is_fast;
    }

    /// Skips producer work for the current tick so the producer can catch up.
    ///
    /// Cleared when the tick goes idle.
    pub fn set_skip_next_producer_work(&mut self) {
        self.skip_next_producer_work = true;
    }

    // -- Notifications ------------------------------------------------------

    /// The producer picked up the dispatched work.
    pub fn notify_producer_work_started(&mut self) {
        debug_assert_eq!(
            self.producer_phase,
            ProducerWorkPhase::Sent,
            "producer work started without being sent"
        );
        if self.producer_phase == ProducerWorkPhase::Sent {
            self.producer_phase = ProducerWorkPhase::Started;
        }
    }

    /// The producer finished and its result can be committed.
    pub fn notify_ready_to_commit(&mut self) {
        debug_assert!(
            matches!(
                self.producer_phase,
                ProducerWorkPhase::Sent | ProducerWorkPhase::Started
            ),
            "ready to commit without producer work in flight"
        );
        if matches!(
            self.producer_phase,
            ProducerWorkPhase::Sent | ProducerWorkPhase::Started
        ) {
            self.producer_phase = ProducerWorkPhase::ReadyToCommit;
        }
    }

    /// Producer work ended without a commit.
    pub fn producer_work_aborted(&mut self, reason: CommitEarlyOutReason) {
        debug_assert!(
            self.producer_phase != ProducerWorkPhase::Idle,
            "abort without producer work in flight"
        );
        if self.producer_phase == ProducerWorkPhase::Idle {
            return;
        }
        if reason.needs_retry() {
            self.producer_phase = ProducerWorkPhase::Idle;
            self.needs_producer_work = true;
        } else {
            self.apply_commit(true);
        }
    }

    /// The pending tree is ready to activate.
    ///
    /// Returns `true` if this changed anything.
    pub fn notify_ready_to_activate(&mut self) -> bool {
        if !self.has_pending_tree || self.pending_tree_is_ready_for_activation {
            return false;
        }
        self.pending_tree_is_ready_for_activation = true;
        true
    }

    /// The active tree has everything it needs to draw.
    pub fn notify_ready_to_draw(&mut self) {
        self.active_tree_is_ready_to_draw = true;
    }

    /// A frame was submitted downstream outside of a scheduled draw.
    pub fn did_submit_frame(&mut self) {
        self.pending_submit_frames += 1;
        self.did_submit_this_tick = true;
    }

    /// Downstream acknowledged a submitted frame.
    pub fn did_receive_submit_ack(&mut self) {
        debug_assert!(self.pending_submit_frames > 0, "ack without a submitted frame");
        self.pending_submit_frames = self.pending_submit_frames.saturating_sub(1);
    }

    /// Tile preparation requested earlier has completed.
    pub fn did_prepare_tiles(&mut self) {
        self.needs_prepare_tiles = false;
        self.did_prepare_tiles_this_tick = true;
    }

    /// The output sink was lost.
    pub fn did_lose_sink(&mut self) {
        if matches!(self.sink_state, SinkState::None | SinkState::Creating) {
            return;
        }
        self.sink_state = SinkState::None;
        self.needs_redraw = false;
    }

    /// The output sink requested by [`Action::BeginSinkCreation`] is ready.
    pub fn did_create_sink(&mut self) {
        debug_assert_eq!(
            self.sink_state,
            SinkState::Creating,
            "sink created without being requested"
        );
        self.sink_state = SinkState::WaitingForFirstCommit;
        self.needs_producer_work = true;
        self.pending_submit_frames = 0;
        self.consecutive_checkerboard_draws = 0;
        self.producer_missed_last_deadline = false;
    }

    // -- Tick phases --------------------------------------------------------

    /// A pulse has begun.
    pub fn on_tick_begin(&mut self, source_id: u64, sequence_number: u64) {
        debug_assert_eq!(self.tick_phase, TickPhase::Idle, "tick began while inside a tick");
        self.source_id = source_id;
        self.sequence_number = sequence_number;
        self.frame_number += 1;
        self.tick_phase = TickPhase::InsidePulse;

        self.needs_one_more_tick = false;
        self.last_commit_had_no_updates = false;
        self.did_draw_this_tick = false;
        self.did_submit_this_tick = false;
        self.did_send_producer_work_this_tick = false;
        self.did_notify_not_sent_this_tick = false;
        self.did_invalidate_sink_this_tick = false;
        self.did_perform_invalidation_this_tick = false;
        self.did_prepare_tiles_this_tick = false;
    }

    /// The pulse's deadline has passed.
    ///
    /// Synchronous embedders call this from idle when they request a draw.
    pub fn on_tick_deadline(&mut self) {
        debug_assert!(
            self.tick_phase == TickPhase::InsidePulse
                || (self.tick_phase == TickPhase::Idle
                    && self.settings.using_synchronous_tick_source),
            "deadline outside of a pulse"
        );
        if self.tick_phase == TickPhase::Idle {
            // Each external draw request gets its own draw slot.
            self.did_draw_this_tick = false;
        }
        self.tick_phase = TickPhase::InsideDeadline;
    }

    /// The tick is over.
    pub fn on_tick_idle(&mut self) {
        debug_assert!(self.tick_phase != TickPhase::Idle, "idle while already idle");
        self.skip_next_producer_work = false;
        // Anything still in the pipeline missed this tick.
        self.producer_missed_last_deadline =
            self.commit_pending() || self.has_pending_tree || self.active_tree_needs_first_draw;
        if !self.tick_needed() {
            self.did_send_producer_work_this_tick = true;
        }
        self.tick_phase = TickPhase::Idle;
    }

    // -- Action pairing -----------------------------------------------------

    fn begin(&mut self, action: Action) {
        debug_assert!(
            self.in_flight.is_none(),
            "{action} began while {:?} was in flight",
            self.in_flight
        );
        self.in_flight = Some(action);
    }

    /// Closes the pair opened by a non-draw `will_*` call.
    pub fn did_perform(&mut self, action: Action) {
        debug_assert_eq!(self.in_flight, Some(action), "did_perform without matching will_*");
        debug_assert!(!action.is_draw(), "draws are closed with did_draw");
        if self.in_flight == Some(action) {
            self.in_flight = None;
        }
    }

    /// About to dispatch producer work.
    pub fn will_send_producer_work(&mut self) {
        self.begin(Action::SendProducerWork);
        debug_assert!(self.should_send_producer_work(), "producer work not due");
        self.needs_producer_work = false;
        self.producer_phase = ProducerWorkPhase::Sent;
        self.did_send_producer_work_this_tick = true;
    }

    /// About to tell the producer no work is coming this tick.
    pub fn will_notify_producer_work_not_sent(&mut self) {
        self.begin(Action::NotifyProducerWorkNotSent);
        self.did_notify_not_sent_this_tick = true;
    }

    /// About to commit.
    pub fn will_commit(&mut self) {
        self.begin(Action::Commit);
        debug_assert!(self.should_commit(), "commit not due");
        self.apply_commit(false);
    }

    fn apply_commit(&mut self, commit_has_no_updates: bool) {
        if !commit_has_no_updates {
            self.has_pending_tree = true;
            self.pending_tree_is_ready_for_activation = false;
            self.pending_tree_is_impl_side = false;
            self.pending_tree_needs_first_draw = true;
            // The commit carries any pending impl-side changes with it.
            self.needs_impl_side_invalidation = false;
            self.next_invalidation_needs_first_draw = false;
        }
        if self.forced_redraw_state == ForcedRedrawState::WaitingForCommit {
            self.forced_redraw_state = if self.has_pending_tree {
                ForcedRedrawState::WaitingForActivation
            } else {
                ForcedRedrawState::WaitingForDraw
            };
        }
        if self.sink_state == SinkState::WaitingForFirstCommit {
            self.sink_state = if self.has_pending_tree {
                SinkState::WaitingForFirstActivation
            } else {
                SinkState::Active
            };
        }
        self.producer_phase = ProducerWorkPhase::Idle;
        self.last_commit_had_no_updates = commit_has_no_updates;
    }

    /// About to activate the pending tree.
    pub fn will_activate(&mut self) {
        self.begin(Action::ActivateSyncTree);
        debug_assert!(self.has_pending_tree, "activation without a pending tree");
        if self.sink_state == SinkState::WaitingForFirstActivation {
            self.sink_state = SinkState::Active;
        }
        if self.forced_redraw_state == ForcedRedrawState::WaitingForActivation {
            self.forced_redraw_state = ForcedRedrawState::WaitingForDraw;
        }
        self.has_pending_tree = false;
        self.pending_tree_is_ready_for_activation = false;
        self.active_tree_needs_first_draw =
            !self.pending_tree_is_impl_side || self.pending_tree_needs_first_draw;
        self.pending_tree_needs_first_draw = false;
        self.active_tree_is_ready_to_draw = !self.settings.wait_for_all_pipeline_stages_before_draw;
        self.needs_redraw = true;
    }

    /// About to perform an impl-side invalidation.
    pub fn will_perform_impl_side_invalidation(&mut self) {
        self.begin(Action::PerformImplSideInvalidation);
        self.needs_impl_side_invalidation = false;
        self.did_perform_invalidation_this_tick = true;
        self.has_pending_tree = true;
        self.pending_tree_is_ready_for_activation = false;
        self.pending_tree_is_impl_side = true;
        self.pending_tree_needs_first_draw = self.next_invalidation_needs_first_draw;
        self.next_invalidation_needs_first_draw = false;
    }

    /// About to perform one of the draw actions.
    pub fn will_draw(&mut self, action: Action) {
        debug_assert!(action.is_draw(), "{action} is not a draw");
        self.begin(action);
        if action != Action::DrawAbort {
            debug_assert!(!self.did_draw_this_tick, "second draw in one tick");
        }
        self.did_draw_this_tick = true;
        self.needs_redraw = false;
        self.active_tree_needs_first_draw = false;
        if self.forced_redraw_state == ForcedRedrawState::WaitingForDraw {
            self.forced_redraw_state = ForcedRedrawState::Idle;
        }
    }

    /// Records the outcome of the draw opened by [`will_draw`](Self::will_draw).
    pub fn did_draw(&mut self, result: DrawResult) {
        debug_assert!(
            self.in_flight.is_some_and(Action::is_draw),
            "did_draw without will_draw"
        );
        if !self.in_flight.is_some_and(Action::is_draw) {
            return;
        }
        self.in_flight = None;

        match result {
            DrawResult::Success => {
                self.consecutive_checkerboard_draws = 0;
                self.forced_redraw_state = ForcedRedrawState::Idle;
                self.did_submit_frame();
            }
            DrawResult::AbortedCheckerboardAnimations => {
                self.needs_producer_work = true;
                self.needs_redraw = true;
                self.consecutive_checkerboard_draws += 1;
                if self.consecutive_checkerboard_draws
                    >= self.settings.max_failed_draws_before_forced
                    && self.forced_redraw_state == ForcedRedrawState::Idle
                {
                    // Forcing only helps once fresh content has landed.
                    self.forced_redraw_state = ForcedRedrawState::WaitingForCommit;
                }
            }
            DrawResult::AbortedMissingHighResContent => {
                self.needs_producer_work = true;
            }
            DrawResult::AbortedCantDraw | DrawResult::AbortedDrainingPipeline => {}
        }
    }

    /// About to begin creating an output sink.
    pub fn will_begin_sink_creation(&mut self) {
        self.begin(Action::BeginSinkCreation);
        debug_assert_eq!(self.sink_state, SinkState::None, "sink creation already underway");
        self.sink_state = SinkState::Creating;
    }

    /// About to prepare tiles.
    pub fn will_prepare_tiles(&mut self) {
        self.begin(Action::PrepareTiles);
        self.needs_prepare_tiles = false;
        self.did_prepare_tiles_this_tick = true;
    }

    /// About to ask the embedder for a draw (synchronous mode).
    pub fn will_invalidate_sink(&mut self) {
        self.begin(Action::InvalidateSink);
        self.did_invalidate_sink_this_tick = true;
        // No draw is guaranteed to follow; do not stall commits on one.
        self.active_tree_needs_first_draw = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn perform(sm: &mut PipelineStateMachine, action: Action) {
        match action {
            Action::None => return,
            Action::SendProducerWork => sm.will_send_producer_work(),
            Action::NotifyProducerWorkNotSent => sm.will_notify_producer_work_not_sent(),
            Action::Commit => sm.will_commit(),
            Action::ActivateSyncTree => sm.will_activate(),
            Action::PerformImplSideInvalidation => sm.will_perform_impl_side_invalidation(),
            Action::DrawIfPossible | Action::DrawForced => {
                sm.will_draw(action);
                sm.did_draw(DrawResult::Success);
                return;
            }
            Action::DrawAbort => {
                sm.will_draw(action);
                sm.did_draw(DrawResult::AbortedDrainingPipeline);
                return;
            }
            Action::BeginSinkCreation => sm.will_begin_sink_creation(),
            Action::PrepareTiles => sm.will_prepare_tiles(),
            Action::InvalidateSink => sm.will_invalidate_sink(),
        }
        sm.did_perform(action);
    }

    #[track_caller]
    fn expect_action(sm: &mut PipelineStateMachine, expected: Action) {
        let action = sm.next_action();
        assert_eq!(action, expected, "state: {:?}", sm.snapshot());
        perform(sm, action);
    }

    fn drain(sm: &mut PipelineStateMachine) -> Vec<Action> {
        let mut out = Vec::new();
        loop {
            let action = sm.next_action();
            if action == Action::None {
                return out;
            }
            perform(sm, action);
            out.push(action);
            assert!(out.len() < 32, "runaway action loop: {out:?}");
        }
    }

    /// Visible, drawable, with an active sink and an empty pipeline.
    fn ready_machine(settings: SchedulerSettings) -> PipelineStateMachine {
        let mut sm = PipelineStateMachine::new(settings);
        sm.set_visible(true);
        sm.set_can_draw(true);
        expect_action(&mut sm, Action::BeginSinkCreation);
        expect_action(&mut sm, Action::None);
        sm.did_create_sink();

        // The first commit has no updates, which activates the sink directly.
        sm.on_tick_begin(0, 1);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.notify_producer_work_started();
        sm.producer_work_aborted(CommitEarlyOutReason::FinishedNoUpdates);
        sm.on_tick_deadline();
        drain(&mut sm);
        sm.on_tick_idle();
        assert_eq!(sm.sink_state(), SinkState::Active, "setup must end with an active sink");
        assert_eq!(sm.next_action(), Action::None, "setup must end quiescent");
        sm
    }

    fn ready() -> PipelineStateMachine {
        ready_machine(SchedulerSettings::default())
    }

    #[test]
    fn next_action_is_idempotent() {
        let mut sm = ready();
        sm.set_needs_redraw();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        let first = sm.next_action();
        for _ in 0..4 {
            assert_eq!(sm.next_action(), first, "query must not mutate");
        }
    }

    #[test]
    fn redraw_draws_inside_pulse_then_goes_quiet() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.set_needs_redraw();
        expect_action(&mut sm, Action::DrawIfPossible);
        assert_eq!(sm.next_action(), Action::None, "no further redraw pending");
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Immediate, "draw slot used");
    }

    #[test]
    fn producer_requests_coalesce_into_one_round() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.set_needs_producer_work();
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        drain(&mut sm);
        sm.on_tick_idle();

        // Still outstanding next tick: no second round.
        sm.on_tick_begin(0, 3);
        assert_ne!(sm.next_action(), Action::SendProducerWork, "one round at a time");
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        expect_action(&mut sm, Action::Commit);
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        expect_action(&mut sm, Action::DrawIfPossible);
    }

    #[test]
    fn begin_frame_not_needed_when_invisible_with_only_redraw() {
        let mut sm = ready();
        sm.set_needs_redraw();
        assert!(sm.tick_needed(), "redraw needs ticks");
        sm.set_visible(false);
        assert!(!sm.tick_needed(), "hidden surfaces need no ticks");
    }

    #[test]
    fn one_more_tick_is_cleared_by_a_tick() {
        let mut sm = ready();
        sm.set_needs_one_more_tick();
        assert!(sm.tick_needed(), "one more tick requested");
        sm.on_tick_begin(0, 2);
        assert!(!sm.tick_needed(), "satisfied by the tick");
    }

    #[test]
    fn deferred_commits_do_not_need_ticks_or_send_work() {
        let mut sm = ready();
        // A commit without updates asks for one more tick; let it pass.
        assert!(sm.tick_needed(), "follow-up tick after an empty commit");
        sm.on_tick_begin(0, 2);
        sm.on_tick_deadline();
        drain(&mut sm);
        sm.on_tick_idle();
        assert!(!sm.tick_needed(), "quiet after the follow-up tick");

        sm.set_defer_commits(true);
        sm.set_needs_producer_work();
        assert!(!sm.tick_needed(), "deferred work does not need ticks");
        sm.on_tick_begin(0, 3);
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::None);
        sm.on_tick_idle();

        sm.set_defer_commits(false);
        assert!(sm.tick_needed(), "released work needs ticks again");
        sm.on_tick_begin(0, 4);
        expect_action(&mut sm, Action::SendProducerWork);
    }

    #[test]
    fn no_producer_work_after_deadline() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.on_tick_deadline();
        sm.set_needs_producer_work();
        sm.set_needs_redraw();
        let actions = drain(&mut sm);
        assert!(
            !actions.contains(&Action::SendProducerWork)
                && !actions.contains(&Action::DrawIfPossible),
            "only forced draws and cleanup after the deadline: {actions:?}"
        );
        assert_eq!(actions, [Action::DrawForced], "the pending redraw is forced");
    }

    #[test]
    fn redraw_waits_for_producer_then_forces_at_deadline() {
        let mut sm = ready();
        sm.set_needs_redraw();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        expect_action(&mut sm, Action::None);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Regular, "wait for producer");
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::DrawForced);
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn aborted_commit_allows_immediate_draw() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.set_needs_redraw();
        sm.set_needs_producer_work();
        expect_action(&mut sm, Action::SendProducerWork);
        expect_action(&mut sm, Action::None);
        sm.notify_producer_work_started();
        sm.producer_work_aborted(CommitEarlyOutReason::FinishedNoUpdates);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Immediate, "nothing to wait for");
        expect_action(&mut sm, Action::DrawIfPossible);
    }

    #[test]
    fn retryable_abort_requests_producer_work_again() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.notify_producer_work_started();
        sm.producer_work_aborted(CommitEarlyOutReason::DeferredCommit);
        assert!(sm.needs_producer_work(), "work re-requested");
        assert_eq!(sm.producer_phase(), ProducerWorkPhase::Idle, "round closed");
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn no_draw_without_capability() {
        let mut sm = ready();
        sm.set_can_draw(false);
        sm.set_needs_redraw();
        sm.on_tick_begin(0, 2);
        let mut actions = drain(&mut sm);
        sm.on_tick_deadline();
        actions.extend(drain(&mut sm));
        assert!(
            !actions
                .iter()
                .any(|a| matches!(a, Action::DrawIfPossible | Action::DrawForced)),
            "no draws without a target: {actions:?}"
        );
    }

    #[test]
    fn cant_draw_with_undrawn_tree_aborts() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        expect_action(&mut sm, Action::Commit);
        sm.set_can_draw(false);
        // Losing the output target does not force activation.
        expect_action(&mut sm, Action::None);
        assert!(sm.has_pending_tree(), "pending tree waits to be ready");
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        assert!(sm.active_tree_needs_first_draw(), "committed content is undrawn");
        expect_action(&mut sm, Action::DrawAbort);
        assert!(!sm.active_tree_needs_first_draw(), "abort drains the tree");
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn throttled_draws_wait_for_ack() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.set_needs_redraw();
        expect_action(&mut sm, Action::DrawIfPossible);
        assert_eq!(sm.pending_submit_frames(), 1, "successful draw submits");
        sm.on_tick_deadline();
        sm.on_tick_idle();

        sm.set_needs_redraw();
        sm.on_tick_begin(0, 3);
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::None);
        sm.on_tick_idle();

        sm.did_receive_submit_ack();
        sm.on_tick_begin(0, 4);
        expect_action(&mut sm, Action::DrawIfPossible);
    }

    #[test]
    fn failed_draw_is_not_retried_in_the_same_tick() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.set_needs_redraw();
        assert_eq!(sm.next_action(), Action::DrawIfPossible, "draw due");
        sm.will_draw(Action::DrawIfPossible);
        sm.did_draw(DrawResult::AbortedCheckerboardAnimations);
        assert!(sm.needs_redraw(), "checkerboard keeps the redraw");
        assert!(sm.needs_producer_work(), "checkerboard requests new content");
        sm.on_tick_deadline();
        let actions = drain(&mut sm);
        assert!(!actions.iter().any(|a| a.is_draw()), "no retry this tick: {actions:?}");
    }

    #[test]
    fn missing_high_res_content_requests_producer_work_only() {
        let mut sm = ready();
        sm.on_tick_begin(0, 2);
        sm.set_needs_redraw();
        sm.will_draw(Action::DrawIfPossible);
        sm.did_draw(DrawResult::AbortedMissingHighResContent);
        assert!(!sm.needs_redraw(), "redraw waits for the commit");
        assert!(sm.needs_producer_work(), "new content requested");
    }

    #[test]
    fn repeated_checkerboards_force_a_draw_after_commit() {
        let settings = SchedulerSettings {
            max_failed_draws_before_forced: 2,
            ..SchedulerSettings::default()
        };
        let mut sm = ready_machine(settings);
        // Performs everything due, failing each draw with a checkerboard.
        fn checkerboard_draws(sm: &mut PipelineStateMachine) -> usize {
            let mut draws = 0;
            loop {
                let action = sm.next_action();
                if action == Action::None {
                    return draws;
                }
                if action.is_draw() {
                    sm.will_draw(action);
                    sm.did_draw(DrawResult::AbortedCheckerboardAnimations);
                    draws += 1;
                } else {
                    perform(sm, action);
                }
            }
        }

        let mut seq = 2;
        sm.set_needs_redraw();
        for _ in 0..2 {
            sm.on_tick_begin(0, seq);
            seq += 1;
            // Once a checkerboard requests producer work, the draw waits for
            // the deadline.
            let mut draws = checkerboard_draws(&mut sm);
            sm.on_tick_deadline();
            draws += checkerboard_draws(&mut sm);
            assert_eq!(draws, 1, "one failed draw per tick");
            sm.on_tick_idle();
            if sm.commit_pending() {
                sm.notify_producer_work_started();
                sm.producer_work_aborted(CommitEarlyOutReason::DeferredCommit);
            }
        }
        assert_eq!(
            sm.forced_redraw_state(),
            ForcedRedrawState::WaitingForCommit,
            "limit reached"
        );

        sm.on_tick_begin(0, seq);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        expect_action(&mut sm, Action::Commit);
        assert_eq!(
            sm.forced_redraw_state(),
            ForcedRedrawState::WaitingForActivation,
            "commit produced a pending tree"
        );
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        expect_action(&mut sm, Action::DrawForced);
        assert_eq!(sm.forced_redraw_state(), ForcedRedrawState::Idle, "forced draw done");
    }

    #[test]
    fn sink_creation_waits_for_outstanding_producer_work() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.did_lose_sink();
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        sm.on_tick_idle();
        expect_action(&mut sm, Action::None);

        sm.notify_producer_work_started();
        sm.producer_work_aborted(CommitEarlyOutReason::SinkLost);
        expect_action(&mut sm, Action::BeginSinkCreation);
    }

    #[test]
    fn deadline_is_immediate_when_sink_lost_or_hidden_or_paused() {
        for change in 0..3 {
            let mut sm = ready();
            sm.set_needs_producer_work();
            sm.on_tick_begin(0, 2);
            expect_action(&mut sm, Action::SendProducerWork);
            assert_ne!(sm.current_deadline_mode(), DeadlineMode::Immediate, "waiting");
            match change {
                0 => sm.did_lose_sink(),
                1 => sm.set_visible(false),
                _ => sm.set_tick_source_paused(true),
            }
            assert!(sm.pending_activations_should_be_forced(), "case {change}");
            assert_eq!(sm.current_deadline_mode(), DeadlineMode::Immediate, "case {change}");
        }
    }

    #[test]
    fn pending_draw_abort_conditions() {
        let mut sm = ready();
        assert!(!sm.pending_draws_should_be_aborted(), "healthy");
        sm.set_can_draw(false);
        assert!(sm.pending_draws_should_be_aborted(), "no target");
        sm.set_can_draw(true);
        sm.set_visible(false);
        assert!(sm.pending_draws_should_be_aborted(), "hidden");
        sm.set_resourceless_software_draw(true);
        assert!(!sm.pending_draws_should_be_aborted(), "software draws work while hidden");
        sm.set_resourceless_software_draw(false);
        sm.set_visible(true);
        sm.set_tick_source_paused(true);
        assert!(sm.pending_draws_should_be_aborted(), "paused");
    }

    #[test]
    fn impl_latency_priority_draws_without_waiting() {
        let mut sm = ready();
        sm.set_needs_redraw();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        expect_action(&mut sm, Action::None);
        sm.set_tree_priorities_and_scroll_state(
            TreePriority::SmoothnessTakesPriority,
            ScrollHandlerState::DoesNotAffectScrollHandler,
        );
        assert!(sm.impl_latency_takes_priority(), "smoothness wins");
        expect_action(&mut sm, Action::DrawIfPossible);
    }

    #[test]
    fn fast_scroll_handler_keeps_producer_in_sync() {
        let mut sm = ready();
        sm.set_tree_priorities_and_scroll_state(
            TreePriority::SmoothnessTakesPriority,
            ScrollHandlerState::AffectsScrollHandler,
        );
        assert!(sm.impl_latency_takes_priority(), "slow handler");
        sm.set_critical_producer_to_activate_is_fast(true);
        assert!(!sm.impl_latency_takes_priority(), "fast handler stays in sync");
    }

    #[test]
    fn impl_side_invalidation_runs_after_deadline() {
        let mut sm = ready();
        sm.set_needs_impl_side_invalidation(true);
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::PerformImplSideInvalidation);
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn impl_side_invalidation_skipped_while_hidden() {
        let mut sm = ready();
        sm.set_visible(false);
        sm.set_needs_impl_side_invalidation(true);
        sm.on_tick_begin(0, 2);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn commit_absorbs_pending_invalidation() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.set_needs_impl_side_invalidation(true);
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        expect_action(&mut sm, Action::Commit);
        assert!(!sm.needs_impl_side_invalidation(), "merged into the commit");
    }

    #[test]
    fn invalidation_waits_for_pending_tree_and_next_tick() {
        let mut sm = ready();
        sm.set_needs_impl_side_invalidation(true);
        sm.on_tick_begin(0, 2);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::PerformImplSideInvalidation);
        sm.set_needs_impl_side_invalidation(true);
        expect_action(&mut sm, Action::None);
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        // Still inside the deadline, so the new tree is drawn right away.
        expect_action(&mut sm, Action::DrawForced);
        expect_action(&mut sm, Action::None);
        sm.on_tick_idle();

        sm.on_tick_begin(0, 3);
        assert!(
            !drain(&mut sm).contains(&Action::PerformImplSideInvalidation),
            "one invalidation per tick, at the deadline"
        );
        sm.on_tick_deadline();
        assert!(
            drain(&mut sm).contains(&Action::PerformImplSideInvalidation),
            "second invalidation at the next deadline"
        );
    }

    #[test]
    fn invalidation_without_first_draw_does_not_block_activation() {
        let mut sm = ready();
        sm.set_needs_impl_side_invalidation(false);
        sm.on_tick_begin(0, 2);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::PerformImplSideInvalidation);
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        assert!(!sm.active_tree_needs_first_draw(), "first draw not required");
    }

    #[test]
    fn prepare_tiles_after_deadline_once_per_tick() {
        let mut sm = ready();
        sm.set_needs_prepare_tiles();
        assert!(sm.tick_needed(), "tile work wants a tick");
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::PrepareTiles);
        sm.set_needs_prepare_tiles();
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn skip_next_producer_work_notifies_instead() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        sm.set_skip_next_producer_work();
        expect_action(&mut sm, Action::NotifyProducerWorkNotSent);
        expect_action(&mut sm, Action::None);
        sm.on_tick_deadline();
        sm.on_tick_idle();
        assert!(!sm.skip_next_producer_work(), "one tick only");

        sm.on_tick_begin(0, 3);
        expect_action(&mut sm, Action::SendProducerWork);
    }

    #[test]
    fn idle_notification_when_producer_opted_in() {
        let mut sm = ready();
        sm.set_wants_producer_not_expected_messages(true);
        sm.set_needs_one_more_tick();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::NotifyProducerWorkNotSent);
        expect_action(&mut sm, Action::None);
    }

    #[test]
    fn missed_deadline_is_recorded_at_idle() {
        let mut sm = ready();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.on_tick_deadline();
        sm.on_tick_idle();
        assert!(sm.producer_missed_last_deadline(), "round still outstanding");
    }

    #[test]
    fn full_pipeline_mode_blocks_until_ready_to_draw() {
        let settings = SchedulerSettings {
            wait_for_all_pipeline_stages_before_draw: true,
            ..SchedulerSettings::default()
        };
        let mut sm = ready_machine(settings);
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Blocked, "producer due");
        expect_action(&mut sm, Action::SendProducerWork);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Blocked, "producer running");
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        expect_action(&mut sm, Action::Commit);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Blocked, "pending tree");
        sm.notify_ready_to_activate();
        expect_action(&mut sm, Action::ActivateSyncTree);
        expect_action(&mut sm, Action::None);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Blocked, "not ready to draw");
        sm.notify_ready_to_draw();
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::Immediate, "ready to draw");
        expect_action(&mut sm, Action::DrawIfPossible);
    }

    #[test]
    fn synchronous_mode_invalidates_instead_of_drawing() {
        let mut sm = ready_machine(SchedulerSettings::synchronous());
        sm.set_needs_redraw();
        sm.on_tick_begin(0, 2);
        assert_eq!(sm.current_deadline_mode(), DeadlineMode::None, "no deadline timer");
        expect_action(&mut sm, Action::InvalidateSink);
        expect_action(&mut sm, Action::None);
        sm.on_tick_idle();

        // The embedder asks for the draw later.
        sm.on_tick_deadline();
        expect_action(&mut sm, Action::DrawForced);
        sm.on_tick_idle();
    }

    #[test]
    fn draw_at_deadline_waits_for_ready_activation() {
        let mut sm = ready();
        sm.set_needs_redraw();
        sm.set_needs_producer_work();
        sm.on_tick_begin(0, 2);
        expect_action(&mut sm, Action::SendProducerWork);
        sm.notify_producer_work_started();
        sm.notify_ready_to_commit();
        sm.on_tick_deadline();
        // Commit and activation land before the last-chance draw.
        expect_action(&mut sm, Action::Commit);
        expect_action(&mut sm, Action::DrawForced);
    }

    #[test]
    #[should_panic(expected = "did_perform without matching will_*")]
    #[cfg(debug_assertions)]
    fn unpaired_did_is_caught_in_debug() {
        let mut sm = ready();
        sm.did_perform(Action::Commit);
    }
}
