//! Ledger actions: pages of ledgers and a single ledger by sequence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actions::{
    Action, Event, EventStream, Problem, Raw, RequestContext, StepResult, StreamSession,
    Structured, Topic,
};
use chrono::Utc;

use crate::ledger::{LEDGER_TOPIC, LedgerHistory, LedgerRecord};
use crate::paging::{CURSOR_NOW, PageQuery};
use crate::resource::{HalPage, LedgerResource};

const LEDGERS_PATH: &str = "/ledgers";

/// Collaborators shared by the ledger actions.
pub struct LedgerEnv {
    pub history: Arc<dyn LedgerHistory>,
    pub base_url: String,
    pub stale_threshold: Duration,
}

impl LedgerEnv {
    /// Fail with `stale_history` when the newest ledger is older than the
    /// stale threshold. Empty history counts as fresh.
    fn ensure_history_freshness(&self) -> StepResult {
        let Some(latest) = self.history.latest()? else {
            return Ok(());
        };
        let age = (Utc::now() - latest.closed_at).to_std().unwrap_or_default();
        if age > self.stale_threshold {
            return Err(Problem::stale_history());
        }
        Ok(())
    }

    fn verify_within_history(&self, sequence: u32) -> StepResult {
        match self.history.elder()? {
            Some(elder) if sequence < elder => Err(Problem::before_history()),
            _ => Ok(()),
        }
    }

    /// Cursors are exclusive: `elder - 1` still resumes at the elder.
    fn verify_cursor_within_history(&self, cursor: u32) -> StepResult {
        self.verify_within_history(cursor.saturating_add(1))
    }

    fn populate(&self, record: &LedgerRecord) -> LedgerResource {
        LedgerResource::populate(&self.base_url, record)
    }
}

/// Renders a page of ledgers, or streams ledgers as they close.
pub struct LedgerIndexAction {
    env: Arc<LedgerEnv>,
    params: HashMap<String, String>,
    query: PageQuery,
    records: Vec<LedgerRecord>,
}

impl LedgerIndexAction {
    pub fn new(env: Arc<LedgerEnv>, params: HashMap<String, String>) -> Self {
        Self {
            env,
            params,
            query: PageQuery::default(),
            records: Vec::new(),
        }
    }

    fn ensure_history_freshness(&mut self, _: &mut RequestContext) -> StepResult {
        self.env.ensure_history_freshness()
    }

    fn load_params(&mut self, _: &mut RequestContext) -> StepResult {
        let latest = self.env.history.latest()?.map(|l| l.sequence);
        self.query = PageQuery::from_params(&self.params, latest)?;
        Ok(())
    }

    /// Streams start at the newest ledger unless the client names a cursor.
    fn default_cursor_to_now(&mut self, _: &mut RequestContext) -> StepResult {
        self.params
            .entry("cursor".to_string())
            .or_insert_with(|| CURSOR_NOW.to_string());
        Ok(())
    }

    fn validate_cursor_within_history(&mut self, _: &mut RequestContext) -> StepResult {
        match self.query.cursor {
            Some(cursor) => self.env.verify_cursor_within_history(cursor),
            None => Ok(()),
        }
    }

    fn load_records(&mut self, _: &mut RequestContext) -> StepResult {
        self.records = self.env.history.page(&self.query)?;
        Ok(())
    }

    fn render_page(&mut self, ctx: &mut RequestContext) -> StepResult {
        let records = self.records.iter().map(|r| self.env.populate(r)).collect();
        let page = HalPage::ledgers(&self.env.base_url, LEDGERS_PATH, &self.query, records);
        ctx.render_json(&page)
    }
}

impl Action for LedgerIndexAction {
    fn as_structured(&mut self) -> Option<&mut dyn Structured> {
        Some(self)
    }

    fn as_event_stream(&mut self) -> Option<&mut dyn EventStream> {
        Some(self)
    }
}

impl Structured for LedgerIndexAction {
    fn structured(&mut self, ctx: &mut RequestContext) {
        ctx.run(
            self,
            &mut [
                &mut Self::ensure_history_freshness,
                &mut Self::load_params,
                &mut Self::validate_cursor_within_history,
                &mut Self::load_records,
                &mut Self::render_page,
            ],
        );
    }
}

impl EventStream for LedgerIndexAction {
    fn topic(&self) -> Topic {
        Topic::new(LEDGER_TOPIC)
    }

    fn setup(&mut self, ctx: &mut RequestContext) {
        ctx.setup(
            self,
            &mut [
                &mut Self::ensure_history_freshness,
                &mut Self::default_cursor_to_now,
                &mut Self::load_params,
                &mut Self::validate_cursor_within_history,
            ],
        );
    }

    /// Reloads the page from the starting cursor and sends the records the
    /// client has not seen yet.
    fn stream(&mut self, ctx: &mut RequestContext, session: &mut StreamSession) {
        ctx.run(
            self,
            &mut [
                &mut Self::load_records,
                &mut |action: &mut Self, _: &mut RequestContext| -> StepResult {
                    session.set_limit(action.query.limit as usize);
                    for record in action.records.iter().skip(session.sent_count()) {
                        let resource = action.env.populate(record);
                        let data = serde_json::to_value(&resource).map_err(|err| {
                            Problem::server_error(format!("serialize ledger: {err}"))
                        })?;
                        session.send(Event::with_id(resource.paging_token, data));
                    }
                    Ok(())
                },
            ],
        );
    }
}

/// Renders a single ledger found by its sequence number.
pub struct LedgerShowAction {
    env: Arc<LedgerEnv>,
    id: String,
    sequence: u32,
    record: Option<LedgerRecord>,
}

impl LedgerShowAction {
    pub fn new(env: Arc<LedgerEnv>, id: impl Into<String>) -> Self {
        Self {
            env,
            id: id.into(),
            sequence: 0,
            record: None,
        }
    }

    fn ensure_history_freshness(&mut self, _: &mut RequestContext) -> StepResult {
        self.env.ensure_history_freshness()
    }

    fn load_params(&mut self, _: &mut RequestContext) -> StepResult {
        self.sequence = self
            .id
            .trim()
            .parse()
            .map_err(|_| Problem::bad_request("id", "id must be a ledger sequence number"))?;
        Ok(())
    }

    fn verify_within_history(&mut self, _: &mut RequestContext) -> StepResult {
        self.env.verify_within_history(self.sequence)
    }

    fn load_record(&mut self, _: &mut RequestContext) -> StepResult {
        let record = self.env.history.by_sequence(self.sequence)?;
        self.record = Some(record.ok_or_else(Problem::not_found)?);
        Ok(())
    }

    fn render_resource(&mut self, ctx: &mut RequestContext) -> StepResult {
        let record = self.record.as_ref().ok_or_else(Problem::not_found)?;
        ctx.render_json(&self.env.populate(record))
    }

    fn render_xdr(&mut self, ctx: &mut RequestContext) -> StepResult {
        let record = self.record.as_ref().ok_or_else(Problem::not_found)?;
        ctx.render_raw(record.to_xdr())
    }
}

impl Action for LedgerShowAction {
    fn as_structured(&mut self) -> Option<&mut dyn Structured> {
        Some(self)
    }

    fn as_raw(&mut self) -> Option<&mut dyn Raw> {
        Some(self)
    }
}

impl Structured for LedgerShowAction {
    fn structured(&mut self, ctx: &mut RequestContext) {
        ctx.run(
            self,
            &mut [
                &mut Self::ensure_history_freshness,
                &mut Self::load_params,
                &mut Self::verify_within_history,
                &mut Self::load_record,
                &mut Self::render_resource,
            ],
        );
    }
}

impl Raw for LedgerShowAction {
    fn raw(&mut self, ctx: &mut RequestContext) {
        ctx.run(
            self,
            &mut [
                &mut Self::ensure_history_freshness,
                &mut Self::load_params,
                &mut Self::verify_within_history,
                &mut Self::load_record,
                &mut Self::render_xdr,
            ],
        );
    }
}
