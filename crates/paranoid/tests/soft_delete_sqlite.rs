use asupersync::runtime::RuntimeBuilder;
use std::sync::atomic::{AtomicI64, Ordering};

use paranoid::prelude::*;
use paranoid::{
    Column, DELETED_AT, Dialect, MappingErrorKind, ObjectState, QueryErrorKind,
    RelationshipInfo, RelationshipKind,
};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

static NOW: AtomicI64 = AtomicI64::new(1_700_000_000_000_000);

/// Strictly increasing so repeated deletes are observable.
fn ticking_clock() -> i64 {
    NOW.fetch_add(1, Ordering::SeqCst)
}

#[derive(Model, Debug, Clone, PartialEq)]
#[paranoid(table = "group", soft_delete)]
#[paranoid(relationship(
    name = "users",
    model = "user",
    link_table(table = "user_group", local_column = "group_id", remote_column = "user_id"),
    back_populates = "groups"
))]
struct Group {
    #[paranoid(primary_key)]
    id: Option<i64>,
    name: String,
    deleted_at: Option<i64>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            deleted_at: None,
        }
    }
}

#[derive(Model, Debug, Clone, PartialEq)]
#[paranoid(table = "user", soft_delete)]
#[paranoid(relationship(
    name = "groups",
    model = "group",
    link_table(table = "user_group", local_column = "user_id", remote_column = "group_id"),
    back_populates = "users"
))]
struct User {
    #[paranoid(primary_key)]
    id: Option<i64>,
    name: String,
    deleted_at: Option<i64>,
}

impl User {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            deleted_at: None,
        }
    }
}

fn user_group() -> Table {
    Table::new("user_group")
        .with_column(Column::new("user_id", SqlType::BigInt).references("user", "id"))
        .with_column(Column::new("group_id", SqlType::BigInt).references("group", "id"))
}

struct Fixture {
    app: Paranoid<SqliteConnection>,
    session: Session<SqliteConnection>,
    admins: Group,
    alive: User,
    deleted: User,
}

/// One group, one live member and one soft-deleted member, flushed.
async fn fixture(cx: &Cx) -> Fixture {
    let app = Paranoid::builder()
        .model::<Group>()
        .model::<User>()
        .table(user_group())
        .session_config(SessionConfig {
            clock: ticking_clock,
            ..SessionConfig::default()
        })
        .build(SqliteConnection::open_memory().expect("open sqlite"))
        .expect("configure mappers");
    unwrap_outcome(app.create_all(cx).await);

    let mut session = app.session();
    let admins_key = session.add(&Group::new("admins"));

    let alive_key = session.add(&User::new("jeanphix"));
    session
        .relate_keys::<User, Group>(&alive_key, "groups", &admins_key)
        .unwrap();

    let deleted_key = session.add(&User::new("deleted"));
    session
        .relate_keys::<User, Group>(&deleted_key, "groups", &admins_key)
        .unwrap();
    assert!(session.delete_key::<User>(&deleted_key));

    unwrap_outcome(session.flush(cx).await);

    Fixture {
        admins: session.object(&admins_key).unwrap(),
        alive: session.object(&alive_key).unwrap(),
        deleted: session.object(&deleted_key).unwrap(),
        app,
        session,
    }
}

fn by_id(table: &str, id: Option<i64>) -> Expr {
    Expr::qualified(table, "id").eq(id.unwrap())
}

#[test]
fn test_softdelete_table_has_deleted_at() {
    assert!(Table::of::<User>().deleted_at().is_some());
    assert!(Table::of::<User>().get("deleted_at").unwrap().nullable);
}

#[test]
fn test_harddelete_table_has_no_deleted_at() {
    #[derive(Model, Debug, Clone)]
    struct Hard {
        #[paranoid(primary_key)]
        id: i64,
    }

    assert!(Table::of::<Hard>().get("deleted_at").is_none());
    assert!(!paranoid::create_table::<Hard>().build().contains("deleted_at"));
}

#[test]
fn test_fixture_stores_deleted_row() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let conn = f.app.connection();
        assert_eq!(conn.row_count("user").unwrap(), 2);
        assert_eq!(conn.row_count("user_group").unwrap(), 2);
        assert_eq!(f.alive.id, Some(1));
        assert_eq!(f.deleted.id, Some(2));
        assert!(f.deleted.deleted_at.is_some());
        assert!(f.alive.deleted_at.is_none());
    });
}

#[test]
fn test_root() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let query = f.app.query::<User>().filter(by_id("user", f.deleted.id));
        let (sql, _) = query.build();
        assert!(sql.ends_with("WHERE \"user\".\"deleted_at\" IS NULL AND \"user\".\"id\" = $1"));

        let outcome = query.one(&cx, f.app.connection()).await;
        assert!(matches!(outcome, Outcome::Err(Error::NoResultFound)));

        let live = unwrap_outcome(f.app.query::<User>().all(&cx, f.app.connection()).await);
        assert_eq!(live, vec![f.alive.clone()]);
        let count = unwrap_outcome(f.app.query::<User>().count(&cx, f.app.connection()).await);
        assert_eq!(count, 1);
    });
}

#[test]
fn test_or_filter_cannot_reach_deleted_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let query = f.app.query::<User>().filter(
            by_id("user", f.deleted.id).or(Expr::qualified("user", "name").eq("deleted")),
        );
        let found = unwrap_outcome(query.all(&cx, f.app.connection()).await);
        assert!(found.is_empty());

        let everything = unwrap_outcome(query.with_deleted().all(&cx, f.app.connection()).await);
        assert_eq!(everything.len(), 2);
    });
}

#[test]
fn test_with_deleted_get() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let conn = f.app.connection();
        let id = f.deleted.id.unwrap();

        let hidden = unwrap_outcome(f.app.query::<User>().get(&cx, conn, id).await);
        assert!(hidden.is_none());

        let found = unwrap_outcome(f.app.query::<User>().with_deleted().get(&cx, conn, id).await);
        assert_eq!(found.unwrap().name, "deleted");
    });
}

#[test]
fn test_joined() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let query = f
            .app
            .query::<User>()
            .include("groups")
            .filter(by_id("user", f.deleted.id));
        let (sql, _) = query.eager_select().unwrap().to_sql(Dialect::Postgres);
        assert!(sql.contains(
            "LEFT JOIN (\"user_group\" INNER JOIN \"group\" ON \"group\".\"id\" = \
             \"user_group\".\"group_id\" AND \"group\".\"deleted_at\" IS NULL)"
        ));

        let outcome = query.one(&cx, f.app.connection()).await;
        assert!(matches!(outcome, Outcome::Err(Error::NoResultFound)));

        let loaded = unwrap_outcome(query.all_eager(&cx, f.app.connection()).await);
        assert!(loaded.is_empty());
    });
}

#[test]
fn test_backref() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let f = fixture(&cx).await;
        let query = f
            .app
            .query::<Group>()
            .include("users")
            .filter(by_id("group", f.admins.id));
        let (sql, _) = query.eager_select().unwrap().to_sql(Dialect::Postgres);
        assert!(sql.contains(
            " LEFT JOIN (\"user_group\" INNER JOIN \"user\" ON \"user\".\"id\" = \
             \"user_group\".\"user_id\" AND \"user\".\"deleted_at\" IS NULL)"
        ));

        let mut loaded = unwrap_outcome(query.all_eager(&cx, f.app.connection()).await);
        assert_eq!(loaded.len(), 1);
        let admins = loaded.remove(0);
        let users: Vec<User> = admins.related("users").unwrap();
        assert!(users.contains(&f.alive));
        assert!(!users.iter().any(|u| u.id == f.deleted.id));
        assert_eq!(admins.into_model(), f.admins);
    });
}

#[test]
fn test_lazy_load() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let users: Vec<User> = unwrap_outcome(
            f.session.load_related(&cx, &f.admins, "users").await,
        );
        assert_eq!(users, vec![f.alive.clone()]);

        let groups: Vec<Group> = unwrap_outcome(
            f.session.load_related(&cx, &f.alive, "groups").await,
        );
        assert_eq!(groups, vec![f.admins.clone()]);

        // Only the target side is filtered; a deleted parent still loads.
        let groups: Vec<Group> = unwrap_outcome(
            f.session.load_related(&cx, &f.deleted, "groups").await,
        );
        assert_eq!(groups.len(), 1);
    });
}

#[test]
fn test_lazy_load_hides_deleted_group() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let mut admins = f.admins.clone();
        assert!(f.session.delete(&mut admins));
        unwrap_outcome(f.session.flush(&cx).await);

        let groups: Vec<Group> = unwrap_outcome(
            f.session.load_related(&cx, &f.alive, "groups").await,
        );
        assert!(groups.is_empty());
        let query = f.session.related_query::<User, Group>(&f.alive, "groups").unwrap();
        let count = unwrap_outcome(query.count(&cx, f.app.connection()).await);
        assert_eq!(count, 0);
    });
}

#[test]
fn test_delete() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let mut alive = f.alive.clone();
        assert!(alive.deleted_at.is_none());
        assert!(f.session.delete(&mut alive));
        assert!(alive.deleted_at.is_some());
        unwrap_outcome(f.session.flush(&cx).await);

        assert_eq!(f.session.object_state(&alive), Some(ObjectState::Persistent));
        assert_eq!(f.app.connection().row_count("user").unwrap(), 2);
        let live = unwrap_outcome(f.app.query::<User>().count(&cx, f.app.connection()).await);
        assert_eq!(live, 0);
    });
}

#[test]
fn test_delete_twice_refreshes_timestamp() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let mut alive = f.alive.clone();
        f.session.delete(&mut alive);
        let first = alive.deleted_at.unwrap();
        f.session.delete(&mut alive);
        let second = alive.deleted_at.unwrap();
        assert!(second > first);
        unwrap_outcome(f.session.flush(&cx).await);

        let stored = f.app.connection().column_values("user", "deleted_at").unwrap();
        assert_eq!(stored[0], Value::TimestampTz(second));
    });
}

#[test]
fn test_delete_hard() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let mut alive = f.alive.clone();
        assert!(!f.session.delete_with(&mut alive, true));
        assert!(alive.deleted_at.is_none());

        // The membership row still references the user.
        match f.session.flush(&cx).await {
            Outcome::Err(Error::Query(q)) => assert_eq!(q.kind, QueryErrorKind::Constraint),
            other => panic!("expected a foreign key violation, got {other:?}"),
        }
        assert_eq!(f.session.pending_delete_count(), 1);

        f.session.unrelate(&alive, "groups", &f.admins).unwrap();
        unwrap_outcome(f.session.flush(&cx).await);
        assert!(!f.session.contains(&alive));

        let conn = f.app.connection();
        assert_eq!(conn.row_count("user").unwrap(), 1);
        assert_eq!(conn.row_count("user_group").unwrap(), 1);
        let gone = unwrap_outcome(
            f.app
                .query::<User>()
                .with_deleted()
                .get(&cx, conn, f.alive.id.unwrap())
                .await,
        );
        assert!(gone.is_none());
    });
}

#[test]
fn test_restore() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let mut deleted = f.deleted.clone();
        f.session.restore(&mut deleted);
        unwrap_outcome(f.session.commit(&cx).await);

        let live = unwrap_outcome(f.app.query::<User>().count(&cx, f.app.connection()).await);
        assert_eq!(live, 2);
        let users: Vec<User> = unwrap_outcome(
            f.session.load_related(&cx, &f.admins, "users").await,
        );
        assert_eq!(users.len(), 2);
    });
}

#[test]
fn test_session_get_honors_soft_delete() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let id = f.deleted.id.unwrap();

        let tracked: Option<User> = unwrap_outcome(f.session.get(&cx, id).await);
        assert!(tracked.is_none());

        f.session.expunge_all();
        let loaded: Option<User> = unwrap_outcome(f.session.get(&cx, id).await);
        assert!(loaded.is_none());
        let loaded: Option<User> = unwrap_outcome(f.session.get_with_deleted(&cx, id).await);
        assert_eq!(loaded.unwrap().name, "deleted");
    });
}

#[test]
fn test_rollback_discards_fixture() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        unwrap_outcome(f.session.rollback(&cx).await);
        assert_eq!(f.app.connection().row_count("user").unwrap(), 0);
        assert_eq!(f.session.tracked_count(), 0);

        unwrap_outcome(f.app.drop_all(&cx).await);
        assert!(f.app.connection().table_names().unwrap().is_empty());
    });
}

#[test]
fn test_composite_join_is_rejected() {
    struct Order;
    struct Line;

    impl Model for Order {
        const TABLE_NAME: &'static str = "order";
        const PRIMARY_KEY: &'static [&'static str] = &["shop", "number"];
        const RELATIONSHIPS: &'static [RelationshipInfo] = &[RelationshipInfo::new(
            "lines",
            "line",
            RelationshipKind::OneToMany,
        )
        .remote_keys(&["order_shop", "order_number"])];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("shop", "shop", SqlType::BigInt).primary_key(true),
                FieldInfo::new("number", "number", SqlType::BigInt).primary_key(true),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    impl Model for Line {
        const TABLE_NAME: &'static str = "line";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        const SOFT_DELETE: bool = true;

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("order_shop", "order_shop", SqlType::BigInt),
                FieldInfo::new("order_number", "order_number", SqlType::BigInt),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    let err = Paranoid::builder()
        .model::<Order>()
        .model::<Line>()
        .build(SqliteConnection::open_memory().expect("open sqlite"))
        .unwrap_err();
    assert_eq!(err.mapping_kind(), Some(MappingErrorKind::UnsupportedJoin));
}

#[derive(Model, Debug, Clone, PartialEq)]
#[paranoid(soft_delete)]
#[paranoid(relationship(
    name = "members",
    model = "member",
    one_to_many,
    remote_key = "team_id",
    back_populates = "team"
))]
struct Team {
    id: Option<i64>,
    name: String,
    deleted_at: Option<i64>,
}

#[derive(Model, Debug, Clone, PartialEq)]
#[paranoid(soft_delete)]
#[paranoid(relationship(name = "team", model = "team", local_key = "team_id", back_populates = "members"))]
struct Member {
    id: Option<i64>,
    name: String,
    #[paranoid(foreign_key = "team.id")]
    team_id: Option<i64>,
    deleted_at: Option<i64>,
}

struct Teams {
    app: Paranoid<SqliteConnection>,
    session: Session<SqliteConnection>,
    red: Team,
    blue: Team,
    alice: Member,
    bob: Member,
}

/// A live team with a live and a deleted member, and a deleted team with a
/// live member.
async fn teams(cx: &Cx) -> Teams {
    let app = Paranoid::builder()
        .model::<Team>()
        .model::<Member>()
        .build(SqliteConnection::open_memory().expect("open sqlite"))
        .expect("configure mappers");
    unwrap_outcome(app.create_all(cx).await);

    let mut session = app.session();
    let team = |name: &str| Team {
        id: None,
        name: name.to_string(),
        deleted_at: None,
    };
    let red_key = session.add(&team("red"));
    let blue_key = session.add(&team("blue"));
    unwrap_outcome(session.flush(cx).await);
    let red: Team = session.object(&red_key).unwrap();
    let blue: Team = session.object(&blue_key).unwrap();

    let member = |name: &str, team: &Team| Member {
        id: None,
        name: name.to_string(),
        team_id: team.id,
        deleted_at: None,
    };
    let alice_key = session.add(&member("alice", &red));
    let carol_key = session.add(&member("carol", &red));
    let bob_key = session.add(&member("bob", &blue));
    assert!(session.delete_key::<Member>(&carol_key));
    assert!(session.delete_key::<Team>(&blue_key));
    unwrap_outcome(session.flush(cx).await);

    Teams {
        red,
        blue: session.object(&blue_key).unwrap(),
        alice: session.object(&alice_key).unwrap(),
        bob: session.object(&bob_key).unwrap(),
        app,
        session,
    }
}

#[test]
fn test_many_to_one_lazy_load_hides_deleted_target() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut t = teams(&cx).await;
        assert_eq!(t.app.connection().row_count("team").unwrap(), 2);
        assert!(t.blue.deleted_at.is_some());

        let team: Vec<Team> = unwrap_outcome(t.session.load_related(&cx, &t.alice, "team").await);
        assert_eq!(team, vec![t.red.clone()]);

        let team: Vec<Team> = unwrap_outcome(t.session.load_related(&cx, &t.bob, "team").await);
        assert!(team.is_empty());
    });
}

#[test]
fn test_one_to_many_lazy_load_hides_deleted_targets() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut t = teams(&cx).await;
        let members: Vec<Member> =
            unwrap_outcome(t.session.load_related(&cx, &t.red, "members").await);
        assert_eq!(members, vec![t.alice.clone()]);

        // The parent side is not filtered.
        let members: Vec<Member> =
            unwrap_outcome(t.session.load_related(&cx, &t.blue, "members").await);
        assert_eq!(members, vec![t.bob.clone()]);
    });
}

#[test]
fn test_many_to_one_eager_load_hides_deleted_target() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let t = teams(&cx).await;
        let query = t.app.query::<Member>().include("team");
        let (sql, _) = query.eager_select().unwrap().to_sql(Dialect::Sqlite);
        assert!(sql.contains(
            "LEFT JOIN \"team\" ON \"team\".\"id\" = \"member\".\"team_id\" AND \
             \"team\".\"deleted_at\" IS NULL"
        ));

        let loaded = unwrap_outcome(query.all_eager(&cx, t.app.connection()).await);
        assert_eq!(loaded.len(), 2);
        for member in &loaded {
            let team: Option<Team> = member.related_one("team").unwrap();
            match member.model.name.as_str() {
                "alice" => assert_eq!(team, Some(t.red.clone())),
                "bob" => assert_eq!(team, None),
                other => panic!("unexpected member {other}"),
            }
        }
    });
}

#[test]
fn test_one_to_many_eager_load_hides_deleted_targets() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let t = teams(&cx).await;
        let loaded = unwrap_outcome(
            t.app
                .query::<Team>()
                .include("members")
                .all_eager(&cx, t.app.connection())
                .await,
        );
        assert_eq!(loaded.len(), 1);
        let members: Vec<Member> = loaded[0].related("members").unwrap();
        assert_eq!(members, vec![t.alice.clone()]);
        assert_eq!(loaded[0].model, t.red);

        let everything = unwrap_outcome(
            t.app
                .query::<Team>()
                .with_deleted()
                .include("members")
                .all_eager(&cx, t.app.connection())
                .await,
        );
        assert_eq!(everything.len(), 2);
        let total: usize = everything
            .iter()
            .map(|team| team.related_rows("members").unwrap().len())
            .sum();
        assert_eq!(total, 2);
    });
}

#[derive(Model, Debug, Clone, PartialEq)]
#[paranoid(soft_delete)]
#[paranoid(relationship(name = "manager", model = "employee", local_key = "manager_id"))]
#[paranoid(relationship(
    name = "reports",
    model = "employee",
    one_to_many,
    remote_key = "manager_id"
))]
struct Employee {
    id: Option<i64>,
    name: String,
    #[paranoid(foreign_key = "employee.id")]
    manager_id: Option<i64>,
    deleted_at: Option<i64>,
}

impl Employee {
    fn new(name: &str, manager: Option<&Employee>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            manager_id: manager.and_then(|m| m.id),
            deleted_at: None,
        }
    }
}

#[test]
fn test_self_referential_relationships() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let app = Paranoid::builder()
            .model::<Employee>()
            .build(SqliteConnection::open_memory().expect("open sqlite"))
            .expect("configure mappers");
        unwrap_outcome(app.create_all(&cx).await);
        let mut session = app.session();

        let boss_key = session.add(&Employee::new("boss", None));
        unwrap_outcome(session.flush(&cx).await);
        let boss: Employee = session.object(&boss_key).unwrap();
        let worker_key = session.add(&Employee::new("worker", Some(&boss)));
        unwrap_outcome(session.flush(&cx).await);
        let worker: Employee = session.object(&worker_key).unwrap();

        let query = app.query::<Employee>().include("manager");
        let (sql, _) = query.eager_select().unwrap().to_sql(Dialect::Sqlite);
        assert!(sql.contains(
            "LEFT JOIN \"employee\" AS \"employee_manager\" ON \
             \"employee_manager\".\"id\" = \"employee\".\"manager_id\" AND \
             \"employee_manager\".\"deleted_at\" IS NULL"
        ));

        let manager: Vec<Employee> =
            unwrap_outcome(session.load_related(&cx, &worker, "manager").await);
        assert_eq!(manager, vec![boss.clone()]);
        let loaded = unwrap_outcome(query.all_eager(&cx, app.connection()).await);
        assert_eq!(loaded.len(), 2);
        for employee in &loaded {
            let manager: Option<Employee> = employee.related_one("manager").unwrap();
            match employee.model.name.as_str() {
                "worker" => assert_eq!(manager, Some(boss.clone())),
                "boss" => assert_eq!(manager, None),
                other => panic!("unexpected employee {other}"),
            }
        }

        assert!(session.delete_key::<Employee>(&boss_key));
        unwrap_outcome(session.flush(&cx).await);

        let manager: Vec<Employee> =
            unwrap_outcome(session.load_related(&cx, &worker, "manager").await);
        assert!(manager.is_empty());
        let boss: Employee = session.object(&boss_key).unwrap();
        let reports: Vec<Employee> =
            unwrap_outcome(session.load_related(&cx, &boss, "reports").await);
        assert_eq!(reports, vec![worker.clone()]);

        let loaded = unwrap_outcome(query.all_eager(&cx, app.connection()).await);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].model, worker);
        assert!(loaded[0].related_one::<Employee>("manager").unwrap().is_none());
    });
}

#[test]
fn test_equal_keyless_objects_insert_separately() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut f = fixture(&cx).await;
        let twin = User::new("twin");
        let first = f.session.add(&twin);
        let second = f.session.add(&twin);
        assert_ne!(first, second);
        assert_eq!(f.session.pending_new_count(), 2);

        assert!(f.session.delete_key::<User>(&second));
        unwrap_outcome(f.session.flush(&cx).await);

        let first: User = f.session.object(&first).unwrap();
        let second: User = f.session.object(&second).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.deleted_at.is_none());
        assert!(second.deleted_at.is_some());
        assert_eq!(f.app.connection().row_count("user").unwrap(), 4);

        let twins = unwrap_outcome(
            f.app
                .query::<User>()
                .filter(Expr::qualified("user", "name").eq("twin"))
                .all(&cx, f.app.connection())
                .await,
        );
        assert_eq!(twins, vec![first]);
    });
}

#[test]
fn test_derived_model_metadata() {
    assert!(User::SOFT_DELETE);
    assert!(!Team::RELATIONSHIPS.is_empty());
    assert_eq!(<Member as Model>::TABLE_NAME, "member");
    assert_eq!(Employee::PRIMARY_KEY, &["id"]);
    assert!(User::fields().iter().all(|f| f.column_name != DELETED_AT));
    assert_eq!(Member::fields()[2].foreign_key_target(), Some(("team", "id")));

    let row = Row::new(
        vec!["id".into(), "name".into(), DELETED_AT.into()],
        vec![Value::BigInt(7), Value::Text("ghost".into()), Value::TimestampTz(42)],
    );
    let plain = User::from_row(&row).unwrap();
    assert_eq!(plain.deleted_at, None);
    let ghost: User = paranoid::hydrate(&row).unwrap();
    assert_eq!(ghost.id, Some(7));
    assert_eq!(ghost.deleted_at, Some(42));
    assert!(ghost.is_deleted());

    let mut fresh = User::new("fresh");
    assert!(fresh.is_new());
    fresh.set_id(3);
    assert_eq!(fresh.primary_key_value(), vec![Value::BigInt(3)]);
}
