use std::sync::Arc;

use tracing::{debug, trace};

use cadence_model::Calendar;

use super::transaction::TxContext;
use crate::error::Result;

impl TxContext<'_> {
    /// Stores the calendar and, when asked, re-derives the next fire time of
    /// every trigger that references it.
    ///
    /// An existing calendar is left untouched unless `replace` is set.
    pub(crate) fn store_calendar(
        &mut self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        debug!(calendar = %name, replace, update_triggers, "store calendar");
        let inserted = self.put_calendar(name, Arc::clone(&calendar), replace)?;
        if !inserted && !replace {
            trace!(calendar = %name, "calendar exists, keeping stored copy");
            return Ok(());
        }
        if !update_triggers {
            return Ok(());
        }

        let threshold = self.config.misfire_threshold();
        for mut record in self.triggers_with_calendar(name)? {
            record
                .trigger
                .update_with_new_calendar(calendar.as_ref(), threshold, self.now);
            trace!(
                trigger = %record.trigger.key,
                next = ?record.trigger.next_fire_time,
                "calendar update"
            );
            self.save_trigger(&record)?;
        }
        Ok(())
    }

    pub(crate) fn remove_calendar(&mut self, name: &str) -> Result<bool> {
        debug!(calendar = %name, "remove calendar");
        self.delete_calendar(name)
    }
}
