//! A corpus stored in SQLite. The store is a single `lines` table with one row per line and rhyme
//! key, an index over `(rhyme, final_word, line)`, and a `comment` table holding a description.

use rusqlite::{params, Connection, OpenFlags};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::annotation::{annotate_lines, Annotator, ContentFilter};
use crate::corpus::{CorpusIndex, CorpusLine, CorpusSource, RhymeKeyCount};
use crate::errors::StorageError;
use crate::types::SyllableRange;

const CREATE_TABLES_SQL: &str = "
    CREATE TABLE lines (
        line        TEXT,
        syllables   SMALLINT,
        final_word  TEXT,
        rhyme       TEXT
    );
    CREATE TABLE comment (
        comment     TEXT
    );
    CREATE INDEX idx ON lines (rhyme, final_word, line);
";

const RHYME_KEYS_SQL: &str = "
    SELECT rhyme, COUNT(rhyme) AS rc
    FROM (
        SELECT rhyme, final_word
        FROM lines
        GROUP BY rhyme, final_word
    )
    GROUP BY rhyme
    HAVING rc >= ?1
    ORDER BY rhyme
";

const RHYME_KEYS_BY_SYLLABLES_SQL: &str = "
    SELECT rhyme, COUNT(rhyme) AS rc
    FROM (
        SELECT rhyme, final_word
        FROM lines
        WHERE syllables BETWEEN ?2 AND ?3
        GROUP BY rhyme, final_word
    )
    GROUP BY rhyme
    HAVING rc >= ?1
    ORDER BY rhyme
";

const LINES_SQL: &str = "
    SELECT line, syllables, final_word, rhyme
    FROM lines
    WHERE rhyme = ?1
    ORDER BY rowid
";

const LINES_BY_SYLLABLES_SQL: &str = "
    SELECT line, syllables, final_word, rhyme
    FROM lines
    WHERE rhyme = ?1 AND syllables BETWEEN ?2 AND ?3
    ORDER BY rowid
";

type RhymeKeyCacheKey = (usize, Option<SyllableRange>);
type LineCacheKey = (String, Option<SyllableRange>);

/// A SQLite-backed corpus. Query results are cached for the life of the value, so a corpus
/// shouldn't be modified by anyone else while it's open. The connection is closed when the value
/// is dropped, or explicitly with `close`.
pub struct SqliteCorpus {
    path: PathBuf,
    connection: Connection,
    rhyme_key_cache: RefCell<HashMap<RhymeKeyCacheKey, Vec<RhymeKeyCount>>>,
    line_cache: RefCell<HashMap<LineCacheKey, Vec<CorpusLine>>>,
}

fn invalid_structure(error: rusqlite::Error) -> StorageError {
    StorageError::InvalidStructure {
        message: error.to_string(),
    }
}

impl SqliteCorpus {
    fn from_connection(path: &Path, connection: Connection) -> Result<SqliteCorpus, StorageError> {
        // Every query we'll run has to at least compile against the schema.
        for sql in [
            RHYME_KEYS_SQL,
            RHYME_KEYS_BY_SYLLABLES_SQL,
            LINES_SQL,
            LINES_BY_SYLLABLES_SQL,
            "SELECT comment FROM comment",
        ] {
            connection.prepare_cached(sql).map_err(invalid_structure)?;
        }

        Ok(SqliteCorpus {
            path: path.to_path_buf(),
            connection,
            rhyme_key_cache: RefCell::new(HashMap::new()),
            line_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Open an existing corpus read-only.
    pub fn open(path: &Path) -> Result<SqliteCorpus, StorageError> {
        if !path.is_file() {
            return Err(StorageError::MissingCorpus {
                path: path.display().to_string(),
            });
        }

        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        SqliteCorpus::from_connection(path, connection)
    }

    /// Build a corpus at `path` from raw lines, unless one already exists there, in which case
    /// the existing one is opened instead.
    pub fn make_new(
        path: &Path,
        source: &CorpusSource,
        annotator: &dyn Annotator,
        filter: &dyn ContentFilter,
        description: Option<&str>,
    ) -> Result<SqliteCorpus, StorageError> {
        if path.exists() {
            debug!(path = %path.display(), "Corpus already exists");
            return SqliteCorpus::open(path);
        }
        SqliteCorpus::make_new_forced(path, source, annotator, filter, description)
    }

    /// Build a corpus at `path` from raw lines, replacing anything already there.
    pub fn make_new_forced(
        path: &Path,
        source: &CorpusSource,
        annotator: &dyn Annotator,
        filter: &dyn ContentFilter,
        description: Option<&str>,
    ) -> Result<SqliteCorpus, StorageError> {
        let raw_lines = source.read_lines()?;
        let rows = annotate_lines(raw_lines.iter().map(String::as_str), annotator, filter);

        if path.exists() {
            fs::remove_file(path).map_err(|_| StorageError::Io {
                path: path.display().to_string(),
            })?;
        }

        let mut connection = Connection::open(path)?;
        connection.execute_batch(CREATE_TABLES_SQL)?;

        let transaction = connection.transaction()?;
        {
            let mut insert =
                transaction.prepare("INSERT INTO lines VALUES (?1, ?2, ?3, ?4)")?;
            for row in &rows {
                insert.execute(params![
                    row.text,
                    row.syllables,
                    row.final_word,
                    row.rhyme_key
                ])?;
            }
            transaction.execute(
                "INSERT INTO comment VALUES (?1)",
                params![description.unwrap_or_default()],
            )?;
        }
        transaction.commit()?;

        info!(
            path = %path.display(),
            raw_lines = raw_lines.len(),
            rows = rows.len(),
            "Created corpus"
        );
        SqliteCorpus::from_connection(path, connection)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The description stored with the corpus, if it has a non-empty one.
    pub fn description(&self) -> Result<Option<String>, StorageError> {
        let mut statement = self
            .connection
            .prepare_cached("SELECT comment FROM comment")?;
        let comments = statement
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments
            .into_iter()
            .flatten()
            .find(|comment| !comment.is_empty()))
    }

    /// Close the connection, reporting any error in doing so.
    pub fn close(self) -> Result<(), StorageError> {
        self.connection.close().map_err(|(_, error)| error.into())
    }
}

fn to_line(row: &rusqlite::Row) -> rusqlite::Result<CorpusLine> {
    Ok(CorpusLine {
        text: row.get(0)?,
        syllables: row.get(1)?,
        final_word: row.get(2)?,
        rhyme_key: row.get(3)?,
    })
}

impl CorpusIndex for SqliteCorpus {
    fn rhyme_keys_with_min_endings(
        &self,
        min_count: usize,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<RhymeKeyCount>, StorageError> {
        let cache_key = (min_count, syllables);
        if let Some(cached) = self.rhyme_key_cache.borrow().get(&cache_key) {
            return Ok(cached.clone());
        }

        let to_count = |row: &rusqlite::Row| -> rusqlite::Result<RhymeKeyCount> {
            Ok(RhymeKeyCount {
                rhyme_key: row.get(0)?,
                count: row.get::<_, i64>(1)? as usize,
            })
        };

        let min_count = min_count as i64;
        let counts = match syllables {
            Some((min, max)) => self
                .connection
                .prepare_cached(RHYME_KEYS_BY_SYLLABLES_SQL)?
                .query_map(params![min_count, min, max], to_count)?
                .collect::<Result<Vec<_>, _>>()?,
            None => self
                .connection
                .prepare_cached(RHYME_KEYS_SQL)?
                .query_map(params![min_count], to_count)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        self.rhyme_key_cache
            .borrow_mut()
            .insert(cache_key, counts.clone());
        Ok(counts)
    }

    fn lines_for_rhyme_key(
        &self,
        rhyme_key: &str,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<CorpusLine>, StorageError> {
        let cache_key = (rhyme_key.to_string(), syllables);
        if let Some(cached) = self.line_cache.borrow().get(&cache_key) {
            return Ok(cached.clone());
        }

        let lines = match syllables {
            Some((min, max)) => self
                .connection
                .prepare_cached(LINES_BY_SYLLABLES_SQL)?
                .query_map(params![rhyme_key, min, max], to_line)?
                .collect::<Result<Vec<_>, _>>()?,
            None => self
                .connection
                .prepare_cached(LINES_SQL)?
                .query_map(params![rhyme_key], to_line)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        self.line_cache.borrow_mut().insert(cache_key, lines.clone());
        Ok(lines)
    }
}
