//! Sector claim pipeline.
//!
//! Sectors are pulled from a [`SectorSource`] into a shared window. Each
//! claimer keeps its own cursor into that window and sees every sector
//! exactly once, in order, after every higher priority claimer has seen it.
//! A claimer may peek ahead of its cursor; peeking first runs the higher
//! priority claimers up to the peeked sector, so their claims are visible,
//! but never moves anybody's cursor.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};

use crate::disc::SectorSource;
use crate::error::{DiscError, PipelineError};
use crate::identified::{IdentifiedSector, SectorKind};
use crate::sector::CdSector;

/// A sector plus its write-once claim slot.
#[derive(Debug)]
pub struct ClaimableSector {
    sector: Arc<CdSector>,
    claim: Option<IdentifiedSector>,
}

impl ClaimableSector {
    fn new(sector: CdSector) -> ClaimableSector {
        ClaimableSector {
            sector: Arc::new(sector),
            claim: None,
        }
    }

    pub fn sector(&self) -> &Arc<CdSector> {
        &self.sector
    }

    pub fn index(&self) -> u32 {
        self.sector.index()
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    pub fn claim(&self) -> Option<&IdentifiedSector> {
        self.claim.as_ref()
    }

    /// Set the slot if it is still empty. Returns whether the claim took.
    fn set_claim(&mut self, identified: IdentifiedSector) -> bool {
        debug_assert_eq!(identified.index(), self.index());
        if self.claim.is_some() {
            return false;
        }
        self.claim = Some(identified);
        true
    }
}

/// Sectors read but not yet released, indexed by absolute sector number.
struct SectorWindow {
    base: u32,
    end: u32,
    sectors: VecDeque<ClaimableSector>,
}

impl SectorWindow {
    fn new(start: u32, end: u32) -> SectorWindow {
        SectorWindow {
            base: start,
            end,
            sectors: VecDeque::new(),
        }
    }

    /// Load sectors up to `index`. `false` once `index` is past the range.
    fn load(&mut self, source: &mut dyn SectorSource, index: u32) -> Result<bool, DiscError> {
        if index >= self.end || index < self.base {
            return Ok(false);
        }
        while self.base as usize + self.sectors.len() <= index as usize {
            let next = self.base + self.sectors.len() as u32;
            trace!("reading sector {}", next);
            let sector = source.read_sector(next)?;
            self.sectors.push_back(ClaimableSector::new(sector));
        }
        Ok(true)
    }

    fn get(&self, index: u32) -> Option<&ClaimableSector> {
        let offset = index.checked_sub(self.base)?;
        self.sectors.get(offset as usize)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut ClaimableSector> {
        let offset = index.checked_sub(self.base)?;
        self.sectors.get_mut(offset as usize)
    }

    /// Drop every sector before `index`.
    fn release_before(&mut self, index: u32) {
        while self.base < index {
            if self.sectors.pop_front().is_none() {
                self.base = index;
                break;
            }
            self.base += 1;
        }
    }
}

/// A format recogniser. Claimers run in registration order.
pub trait Claimer {
    fn name(&self) -> &'static str;

    /// Called exactly once per sector, in order. The current sector may
    /// already be claimed by a higher priority claimer.
    fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError>;

    /// Called once after the last sector.
    fn on_end_of_sectors(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

struct Stage {
    claimer: Box<dyn Claimer>,
    next: u32,
}

/// A claimer's view of the window during one `on_sector` call.
pub struct ClaimCursor<'c> {
    index: u32,
    earlier: &'c mut [Stage],
    source: &'c mut dyn SectorSource,
    window: &'c mut SectorWindow,
}

impl<'c> ClaimCursor<'c> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn current(&self) -> &ClaimableSector {
        &self.window.sectors[(self.index - self.window.base) as usize]
    }

    /// Claim the current sector. `false` if it was already claimed.
    pub fn claim_current(&mut self, identified: IdentifiedSector) -> bool {
        let index = self.index;
        match self.window.get_mut(index) {
            Some(slot) => slot.set_claim(identified),
            None => false,
        }
    }

    /// Look at the sector `ahead` positions after the current one without
    /// consuming it. Returns `None` past the end of the range.
    pub fn peek(&mut self, ahead: u32) -> Result<Option<&ClaimableSector>, PipelineError> {
        let Some(target) = self.index.checked_add(ahead) else {
            return Ok(None);
        };
        advance(self.earlier, self.source, self.window, target)?;
        if !self.window.load(self.source, target)? {
            return Ok(None);
        }
        Ok(self.window.get(target))
    }

    /// Claim a sector ahead of the current one. The sector is peeked first,
    /// so higher priority claimers get their chance at it.
    pub fn claim_ahead(&mut self, ahead: u32, identified: IdentifiedSector) -> Result<bool, PipelineError> {
        if self.peek(ahead)?.is_none() {
            return Ok(false);
        }
        let target = self.index + ahead;
        Ok(self
            .window
            .get_mut(target)
            .map_or(false, |slot| slot.set_claim(identified)))
    }
}

/// Run the last stage of `stages` (and, first, everything before it) up to
/// and including sector `upto`.
fn advance(
    stages: &mut [Stage],
    source: &mut dyn SectorSource,
    window: &mut SectorWindow,
    upto: u32,
) -> Result<(), PipelineError> {
    let Some((stage, earlier)) = stages.split_last_mut() else {
        return Ok(());
    };

    while stage.next <= upto {
        let index = stage.next;
        advance(earlier, source, window, index)?;
        if !window.load(source, index)? {
            break;
        }
        let mut cursor = ClaimCursor {
            index,
            earlier: &mut *earlier,
            source: &mut *source,
            window: &mut *window,
        };
        stage.claimer.on_sector(&mut cursor)?;
        stage.next += 1;
    }
    Ok(())
}

/// Receives identified sectors of one kind (or all kinds).
pub trait SectorListener {
    /// `None` receives every sector.
    fn kind(&self) -> Option<SectorKind>;

    fn feed(&mut self, sector: &IdentifiedSector) -> Result<(), PipelineError>;

    fn end_of_feed(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Pull-based pipeline turning raw sectors into [`IdentifiedSector`]s.
pub struct SectorClaimPipeline<'a, S> {
    source: S,
    window: SectorWindow,
    stages: Vec<Stage>,
    listeners: Vec<Box<dyn SectorListener + 'a>>,
    next: u32,
    end: u32,
    failed: bool,
    flushed: bool,
}

impl<'a, S: SectorSource> SectorClaimPipeline<'a, S> {
    /// Pipeline over every sector of `source`.
    pub fn new(source: S) -> Self {
        let count = source.sector_count();
        Self::with_range(source, 0, count.saturating_sub(1))
    }

    /// Pipeline over sectors `start..=end`, clamped to the source.
    pub fn with_range(source: S, start: u32, end: u32) -> Self {
        let end = if source.sector_count() == 0 {
            start
        } else {
            end.min(source.sector_count() - 1) + 1
        };
        SectorClaimPipeline {
            source,
            window: SectorWindow::new(start, end),
            stages: Vec::new(),
            listeners: Vec::new(),
            next: start,
            end,
            failed: false,
            flushed: false,
        }
    }

    /// Register claimers in priority order, highest first.
    pub fn add_claimer(&mut self, claimer: Box<dyn Claimer>) -> &mut Self {
        debug!("claimer {} at priority {}", claimer.name(), self.stages.len());
        self.stages.push(Stage {
            claimer,
            next: self.next,
        });
        self
    }

    pub fn add_claimers(&mut self, claimers: Vec<Box<dyn Claimer>>) -> &mut Self {
        for c in claimers {
            self.add_claimer(c);
        }
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn SectorListener + 'a>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    pub fn has_next(&self) -> bool {
        !self.failed && self.next < self.end
    }

    fn resolve(&mut self, index: u32) -> Result<Option<IdentifiedSector>, PipelineError> {
        advance(&mut self.stages, &mut self.source, &mut self.window, index)?;
        if !self.window.load(&mut self.source, index)? {
            return Ok(None);
        }
        let Some(slot) = self.window.get_mut(index) else {
            return Ok(None);
        };
        let identified = slot
            .claim
            .take()
            .unwrap_or_else(|| IdentifiedSector::Unidentified(Arc::clone(&slot.sector)));
        trace!("{}", identified);

        let kind = identified.kind();
        for listener in self.listeners.iter_mut() {
            if listener.kind().map_or(true, |k| k == kind) {
                listener.feed(&identified)?;
            }
        }
        Ok(Some(identified))
    }

    /// The next identified sector. At the end of the range the claimers and
    /// listeners are flushed; a flush failure is reported as the last item.
    pub fn next_sector(&mut self) -> Option<Result<IdentifiedSector, PipelineError>> {
        if !self.has_next() {
            if self.failed || self.flushed {
                return None;
            }
            return self.flush().err().map(Err);
        }

        let index = self.next;
        match self.resolve(index) {
            Ok(Some(identified)) => {
                self.next += 1;
                self.window.release_before(self.next);
                Some(Ok(identified))
            }
            Ok(None) => {
                self.next = self.end;
                self.flush().err().map(Err)
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    /// Tell claimers and listeners that no more sectors will come. Runs once.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        for stage in self.stages.iter_mut() {
            stage.claimer.on_end_of_sectors()?;
        }
        for listener in self.listeners.iter_mut() {
            listener.end_of_feed()?;
        }
        Ok(())
    }

    /// Drain the pipeline, feeding listeners, and flush.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        while let Some(item) = self.next_sector() {
            item?;
        }
        self.flush()
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<'a, S: SectorSource> Iterator for SectorClaimPipeline<'a, S> {
    type Item = Result<IdentifiedSector, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sector()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identified::CdAudioSector;
    use crate::sector::SectorLayout;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory source; sector `i` carries byte `i` everywhere.
    struct MemorySource {
        count: u32,
        fail_at: Option<u32>,
        reads: Rc<RefCell<Vec<u32>>>,
    }

    impl MemorySource {
        fn new(count: u32) -> Self {
            MemorySource {
                count,
                fail_at: None,
                reads: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl SectorSource for MemorySource {
        fn sector_count(&self) -> u32 {
            self.count
        }

        fn read_sector(&mut self, index: u32) -> Result<CdSector, DiscError> {
            self.reads.borrow_mut().push(index);
            if Some(index) == self.fail_at {
                return Err(DiscError::TruncatedSector { index });
            }
            Ok(CdSector::new(index, SectorLayout::Iso2048, vec![index as u8; 2048]))
        }
    }

    fn tag(sector: &Arc<CdSector>, confidence: u8) -> IdentifiedSector {
        IdentifiedSector::CdAudio(CdAudioSector {
            sector: Arc::clone(sector),
            confidence,
        })
    }

    /// Claims sectors whose byte is a multiple of `modulus`; records what it saw.
    struct ModClaimer {
        modulus: u8,
        confidence: u8,
        seen: Rc<RefCell<Vec<(u32, bool)>>>,
    }

    impl Claimer for ModClaimer {
        fn name(&self) -> &'static str {
            "mod"
        }

        fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
            let current = cursor.current();
            self.seen.borrow_mut().push((current.index(), current.is_claimed()));
            if current.sector().user_data()[0] % self.modulus == 0 {
                let id = tag(current.sector(), self.confidence);
                cursor.claim_current(id);
            }
            Ok(())
        }
    }

    /// Peeks `ahead` sectors and claims the furthest one.
    struct LookaheadClaimer {
        ahead: u32,
        peeked: Rc<RefCell<Vec<(u32, bool)>>>,
        took: Rc<RefCell<Vec<bool>>>,
    }

    impl Claimer for LookaheadClaimer {
        fn name(&self) -> &'static str {
            "lookahead"
        }

        fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
            if cursor.index() != 0 {
                return Ok(());
            }
            let Some(peeked) = cursor.peek(self.ahead)? else {
                return Ok(());
            };
            self.peeked.borrow_mut().push((peeked.index(), peeked.is_claimed()));
            let id = tag(peeked.sector(), 7);
            let took = cursor.claim_ahead(self.ahead, id)?;
            self.took.borrow_mut().push(took);
            Ok(())
        }
    }

    #[test]
    fn earlier_claimer_wins() {
        let first_seen = Rc::new(RefCell::new(Vec::new()));
        let second_seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(6));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 2,
            confidence: 50,
            seen: first_seen.clone(),
        }));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 3,
            confidence: 90,
            seen: second_seen.clone(),
        }));

        let out: Vec<_> = pipeline.map(|r| r.unwrap()).collect();
        let confidences: Vec<u8> = out.iter().map(|s| s.confidence()).collect();
        // 0,2,4 -> first; 3 -> second; 1,5 unidentified
        assert_eq!(confidences, vec![50, 0, 50, 90, 50, 0]);
        assert_eq!(out[1].kind(), SectorKind::Unidentified);

        // Each claimer sees every sector once, in order.
        let idx: Vec<u32> = second_seen.borrow().iter().map(|(i, _)| *i).collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
        let claimed: Vec<bool> = second_seen.borrow().iter().map(|(_, c)| *c).collect();
        assert_eq!(claimed, vec![true, false, true, false, true, false]);
        assert_eq!(first_seen.borrow().len(), 6);
    }

    #[test]
    fn peek_sees_earlier_claims_and_does_not_consume() {
        let first_seen = Rc::new(RefCell::new(Vec::new()));
        let peeked = Rc::new(RefCell::new(Vec::new()));
        let third_seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(8));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 4,
            confidence: 50,
            seen: first_seen.clone(),
        }));
        pipeline.add_claimer(Box::new(LookaheadClaimer {
            ahead: 5,
            peeked: peeked.clone(),
            took: Rc::new(RefCell::new(Vec::new())),
        }));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 1,
            confidence: 10,
            seen: third_seen.clone(),
        }));

        let out: Vec<_> = pipeline.map(|r| r.unwrap()).collect();
        assert_eq!(out.len(), 8);
        assert_eq!(out.iter().map(|s| s.index()).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());

        // The first claimer ran ahead to sector 5 before it was peeked.
        assert_eq!(*peeked.borrow(), vec![(5, false)]);
        assert_eq!(out[5].confidence(), 7);
        assert_eq!(out[4].confidence(), 50);
        assert_eq!(out[1].confidence(), 10);

        // The last claimer still saw sector 5, already claimed.
        assert_eq!(third_seen.borrow()[5], (5, true));
        assert_eq!(first_seen.borrow().len(), 8);
    }

    #[test]
    fn each_sector_read_once() {
        let source = MemorySource::new(5);
        let reads = source.reads.clone();
        let mut pipeline = SectorClaimPipeline::new(source);
        pipeline.add_claimer(Box::new(LookaheadClaimer {
            ahead: 3,
            peeked: Rc::new(RefCell::new(Vec::new())),
            took: Rc::new(RefCell::new(Vec::new())),
        }));
        assert_eq!(pipeline.count(), 5);
        assert_eq!(*reads.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn peek_past_end_is_none() {
        let peeked = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(3));
        pipeline.add_claimer(Box::new(LookaheadClaimer {
            ahead: 10,
            peeked: peeked.clone(),
            took: Rc::new(RefCell::new(Vec::new())),
        }));
        assert_eq!(pipeline.by_ref().filter(|r| r.is_ok()).count(), 3);
        assert!(peeked.borrow().is_empty());
    }

    /// Peeks `u32::MAX` sectors ahead of every sector.
    struct FarPeekClaimer {
        results: Rc<RefCell<Vec<(bool, bool)>>>,
    }

    impl Claimer for FarPeekClaimer {
        fn name(&self) -> &'static str {
            "far-peek"
        }

        fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
            let peeked = cursor.peek(u32::MAX)?.is_some();
            let id = tag(cursor.current().sector(), 1);
            let claimed = cursor.claim_ahead(u32::MAX, id)?;
            self.results.borrow_mut().push((peeked, claimed));
            Ok(())
        }
    }

    #[test]
    fn huge_peek_is_none() {
        let results = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(3));
        pipeline.add_claimer(Box::new(FarPeekClaimer {
            results: results.clone(),
        }));
        let out: Vec<_> = pipeline.map(|r| r.unwrap()).collect();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| s.kind() == SectorKind::Unidentified));
        assert_eq!(*results.borrow(), vec![(false, false); 3]);
    }

    #[test]
    fn claim_ahead_cannot_overwrite_earlier_claim() {
        let peeked = Rc::new(RefCell::new(Vec::new()));
        let took = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(6));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 4,
            confidence: 50,
            seen: Rc::new(RefCell::new(Vec::new())),
        }));
        pipeline.add_claimer(Box::new(LookaheadClaimer {
            ahead: 4,
            peeked: peeked.clone(),
            took: took.clone(),
        }));

        let out: Vec<_> = pipeline.map(|r| r.unwrap()).collect();
        assert_eq!(*took.borrow(), vec![false]);
        // Sector 4 was claimed by the first claimer before the peek saw it.
        assert_eq!(*peeked.borrow(), vec![(4, true)]);
        assert_eq!(out[4].confidence(), 50);
        assert_eq!(out[4].kind(), SectorKind::CdAudio);
    }

    #[test]
    fn range_is_respected() {
        let pipeline = SectorClaimPipeline::with_range(MemorySource::new(10), 3, 5);
        let idx: Vec<u32> = pipeline.map(|r| r.unwrap().index()).collect();
        assert_eq!(idx, vec![3, 4, 5]);
    }

    #[test]
    fn read_failure_is_fatal() {
        let mut source = MemorySource::new(6);
        source.fail_at = Some(2);
        let mut pipeline = SectorClaimPipeline::new(source);
        assert!(pipeline.next().unwrap().is_ok());
        assert!(pipeline.next().unwrap().is_ok());
        assert!(matches!(
            pipeline.next(),
            Some(Err(PipelineError::Disc(DiscError::TruncatedSector { index: 2 })))
        ));
        assert!(pipeline.next().is_none());
        assert!(!pipeline.has_next());
    }

    struct Counter {
        kind: Option<SectorKind>,
        fed: Rc<RefCell<Vec<u32>>>,
        ended: Rc<RefCell<u32>>,
    }

    impl SectorListener for Counter {
        fn kind(&self) -> Option<SectorKind> {
            self.kind
        }

        fn feed(&mut self, sector: &IdentifiedSector) -> Result<(), PipelineError> {
            self.fed.borrow_mut().push(sector.index());
            Ok(())
        }

        fn end_of_feed(&mut self) -> Result<(), PipelineError> {
            *self.ended.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn listeners_are_filtered_and_flushed_once() {
        let audio = Rc::new(RefCell::new(Vec::new()));
        let all = Rc::new(RefCell::new(Vec::new()));
        let ended = Rc::new(RefCell::new(0));
        let mut pipeline = SectorClaimPipeline::new(MemorySource::new(4));
        pipeline.add_claimer(Box::new(ModClaimer {
            modulus: 2,
            confidence: 100,
            seen: Rc::new(RefCell::new(Vec::new())),
        }));
        pipeline.add_listener(Box::new(Counter {
            kind: Some(SectorKind::CdAudio),
            fed: audio.clone(),
            ended: ended.clone(),
        }));
        pipeline.add_listener(Box::new(Counter {
            kind: None,
            fed: all.clone(),
            ended: ended.clone(),
        }));
        pipeline.run().unwrap();
        pipeline.flush().unwrap();

        assert_eq!(*audio.borrow(), vec![0, 2]);
        assert_eq!(*all.borrow(), vec![0, 1, 2, 3]);
        assert_eq!(*ended.borrow(), 2);
    }
}
