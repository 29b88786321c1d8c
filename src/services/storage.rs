//! Service 15: storage and retrieval.
//!
//! Packet stores are identified by a `u16` store ID, time tags are CUC timestamps written as
//! `u32`. Retrieved packets are downlinked unchanged, they are never stored again.
use super::{ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::packet_store::{OpenRetrievalStatus, PacketStoreError, PacketStoreId};
use crate::ecss::{ErrorCode, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use crate::time::cuc::CucTime;
use alloc::vec::Vec;
use tracing::{debug, info};

pub const MSG_TYPE_ENABLE_STORAGE: u8 = 1;
pub const MSG_TYPE_DISABLE_STORAGE: u8 = 2;
pub const MSG_TYPE_RETRIEVE_RANGE: u8 = 9;
pub const MSG_TYPE_DELETE_UP_TO: u8 = 11;
pub const MSG_TYPE_REPORT_SUMMARY: u8 = 12;
pub const MSG_TYPE_SUMMARY_REPORT: u8 = 13;
pub const MSG_TYPE_CHANGE_OPEN_RETRIEVAL_TAG: u8 = 14;
pub const MSG_TYPE_RESUME_OPEN_RETRIEVAL: u8 = 15;
pub const MSG_TYPE_SUSPEND_OPEN_RETRIEVAL: u8 = 16;

#[derive(Debug, Default)]
pub struct StorageService {
    counters: MessageTypeCounters,
}

fn read_time(tc: &mut Message) -> Result<CucTime, ExecutionFailure> {
    Ok(CucTime(tc.read_u32()?))
}

impl StorageService {
    fn retrieve_range(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        let id = tc.read_u16()?;
        let start = read_time(tc)?;
        let end = read_time(tc)?;
        let store = ctx
            .packet_stores
            .get(id)
            .ok_or(PacketStoreError::UnknownStore(id))?;
        let packets = store.retrieve_range(start, end);
        debug!(
            store = id,
            start = start.ticks(),
            end = end.ticks(),
            num = packets.len(),
            "range retrieval"
        );
        for packet in packets {
            out.downlink(packet.data);
        }
        Ok(())
    }

    fn report_summary(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        let num = tc.read_u16()?;
        let mut ids: Vec<PacketStoreId> = Vec::with_capacity(num as usize);
        for _ in 0..num {
            let id = tc.read_u16()?;
            if ctx.packet_stores.get(id).is_none() {
                return Err(PacketStoreError::UnknownStore(id).into());
            }
            ids.push(id);
        }
        let mut report = out.start_report(
            ctx.now(),
            self.service_type(),
            MSG_TYPE_SUMMARY_REPORT,
            self.counters.get_and_increment(MSG_TYPE_SUMMARY_REPORT),
        )?;
        report.append_u16(ids.len() as u16)?;
        for id in ids {
            let Some(store) = ctx.packet_stores.get(id) else {
                continue;
            };
            let summary = store.summary();
            report.append_u16(id)?;
            report.append_u32(summary.oldest.map(|t| t.ticks()).unwrap_or(0))?;
            report.append_u32(summary.newest.map(|t| t.ticks()).unwrap_or(0))?;
            report.append_u32(summary.open_retrieval_tag.ticks())?;
            report.append_u8(summary.fill_percentage)?;
        }
        out.send(report)?;
        Ok(())
    }
}

impl PusService for StorageService {
    fn service_type(&self) -> u8 {
        PusServiceId::StorageAndRetrieval as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[
            MSG_TYPE_ENABLE_STORAGE,
            MSG_TYPE_DISABLE_STORAGE,
            MSG_TYPE_RETRIEVE_RANGE,
            MSG_TYPE_DELETE_UP_TO,
            MSG_TYPE_REPORT_SUMMARY,
            MSG_TYPE_CHANGE_OPEN_RETRIEVAL_TAG,
            MSG_TYPE_RESUME_OPEN_RETRIEVAL,
            MSG_TYPE_SUSPEND_OPEN_RETRIEVAL,
        ]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_ENABLE_STORAGE | MSG_TYPE_DISABLE_STORAGE => {
                let enabled = tc.message_type() == MSG_TYPE_ENABLE_STORAGE;
                let id = tc.read_u16()?;
                ctx.packet_stores.get_mut(id)?.set_storage_enabled(enabled);
                info!(store = id, enabled, "packet storage switched");
            }
            MSG_TYPE_RETRIEVE_RANGE => self.retrieve_range(tc, ctx, out)?,
            MSG_TYPE_DELETE_UP_TO => {
                let id = tc.read_u16()?;
                let tag = read_time(tc)?;
                let deleted = ctx.packet_stores.get_mut(id)?.delete_up_to(tag);
                debug!(store = id, tag = tag.ticks(), deleted, "deleted stored packets");
            }
            MSG_TYPE_REPORT_SUMMARY => self.report_summary(tc, ctx, out)?,
            MSG_TYPE_CHANGE_OPEN_RETRIEVAL_TAG => {
                let id = tc.read_u16()?;
                let tag = read_time(tc)?;
                ctx.packet_stores.get_mut(id)?.set_open_retrieval_tag(tag);
            }
            MSG_TYPE_RESUME_OPEN_RETRIEVAL | MSG_TYPE_SUSPEND_OPEN_RETRIEVAL => {
                let status = if tc.message_type() == MSG_TYPE_RESUME_OPEN_RETRIEVAL {
                    OpenRetrievalStatus::InProgress
                } else {
                    OpenRetrievalStatus::Suspended
                };
                let id = tc.read_u16()?;
                ctx.packet_stores
                    .get_mut(id)?
                    .set_open_retrieval_status(status);
            }
            _ => return Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType)),
        }
        Ok(())
    }

    /// Downlink everything stored since the last tick for stores with an open retrieval in
    /// progress.
    fn tick(&mut self, ctx: &mut PusContext, out: &mut Outbox) {
        for (_, store) in ctx.packet_stores.iter_mut() {
            if store.open_retrieval_status() != OpenRetrievalStatus::InProgress {
                continue;
            }
            for packet in store.retrieve_open(None) {
                out.downlink(packet.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecss::packet_store::{OverflowPolicy, PacketStore};
    use crate::ecss::tm::TM_HEADER_LEN;
    use crate::ecss::verification::VerificationOutcome;
    use crate::services::tests::{dispatcher, tc, types};
    use alloc::vec;

    fn ctx() -> PusContext {
        let mut ctx = PusContext::default();
        ctx.packet_stores
            .add(3, PacketStore::new(0, OverflowPolicy::Circular, 100))
            .unwrap();
        for (time, byte) in [(1, 0xA), (2, 0xB), (4, 0xC)] {
            ctx.packet_stores.store(0, CucTime(time), &[byte; 10]);
        }
        ctx
    }

    #[test]
    fn test_range_retrieval() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(15, 9, &[0, 3, 0, 0, 0, 2, 0, 0, 0, 4]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 7)]);
        assert_eq!(output.downlink, vec![vec![0xB; 10], vec![0xC; 10]]);
        // Range retrieval does not remove packets.
        assert_eq!(ctx.packet_stores.get(3).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_store() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(15, 1, &[0, 9]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownPacketStore)
        );
    }

    #[test]
    fn test_enable_disable_storage() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        dispatcher.dispatch(&tc(15, 2, &[0, 3]), &mut ctx);
        assert!(!ctx.packet_stores.get(3).unwrap().storage_enabled());
        ctx.packet_stores.store(0, CucTime(5), &[0xD; 10]);
        assert_eq!(ctx.packet_stores.get(3).unwrap().len(), 3);
        dispatcher.dispatch(&tc(15, 1, &[0, 3]), &mut ctx);
        ctx.packet_stores.store(0, CucTime(5), &[0xD; 10]);
        assert_eq!(ctx.packet_stores.get(3).unwrap().len(), 4);
    }

    #[test]
    fn test_delete_and_summary() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        dispatcher.dispatch(&tc(15, 11, &[0, 3, 0, 0, 0, 1]), &mut ctx);
        assert_eq!(ctx.packet_stores.get(3).unwrap().len(), 2);

        let output = dispatcher.dispatch(&tc(15, 12, &[0, 1, 0, 3]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (15, 13), (1, 7)]);
        assert_eq!(
            &output.tm[2][TM_HEADER_LEN..TM_HEADER_LEN + 17],
            &[0, 1, 0, 3, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 0, 20]
        );
    }

    #[test]
    fn test_open_retrieval() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        dispatcher.dispatch(&tc(15, 14, &[0, 3, 0, 0, 0, 2]), &mut ctx);
        // Suspended open retrieval does not downlink anything.
        assert!(dispatcher.tick(&mut ctx).downlink.is_empty());
        dispatcher.dispatch(&tc(15, 15, &[0, 3]), &mut ctx);
        let output = dispatcher.tick(&mut ctx);
        assert_eq!(output.downlink, vec![vec![0xB; 10], vec![0xC; 10]]);
        assert!(dispatcher.tick(&mut ctx).downlink.is_empty());
        ctx.packet_stores.store(0, CucTime(4), &[0xE; 10]);
        assert_eq!(dispatcher.tick(&mut ctx).downlink, vec![vec![0xE; 10]]);
        dispatcher.dispatch(&tc(15, 16, &[0, 3]), &mut ctx);
        ctx.packet_stores.store(0, CucTime(6), &[0xF; 10]);
        assert!(dispatcher.tick(&mut ctx).downlink.is_empty());
    }
}
