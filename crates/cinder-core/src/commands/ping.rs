use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{insert, Table};
use crate::db::Db;

fn ping(_db: &Db, _args: &[Bytes]) -> Frame {
    reply::pong()
}

pub(super) fn register(table: &mut Table) {
    insert(table, "ping", ping, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pongs() {
        let db = Db::new(0);
        assert_eq!(ping(&db, &[]), Frame::Simple("PONG".into()));
    }
}
