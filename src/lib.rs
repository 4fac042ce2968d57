pub mod core;
pub mod storage;
pub mod index;
pub mod parallel;

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                           BIBLIOX STRUCT ARCHITECTURE                             │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── CORE LAYER ──────────────────────────────────┐
│                                                                                   │
│  ┌───────────────────────────────────────────────────────────────────────────┐   │
│  │                              struct Catalog                                │   │
│  │  config: Config                 // Directories, shard capacity, loader     │   │
│  │  layout: Arc<StorageLayout>     // Shard and index file naming             │   │
│  │  store: RecordStore             // Single-record reads and writes          │   │
│  │  builder: IndexBuilder          // Full index rebuild                      │   │
│  │  loader: BulkLoader             // Parallel ingestion                      │   │
│  │  _lock: FileLock                // One catalog per directory set           │   │
│  └───────────────────────────────────────────────────────────────────────────┘   │
│                                                                                   │
│  ┌──────────────────┐  ┌────────────────────┐  ┌──────────────────────────────┐  │
│  │ struct MotherId  │  │ struct MotherRecord│  │ struct CopyRecord            │  │
│  │ • family         │  │ • title (name)     │  │ • mother_id (book_id)        │  │
│  │ • shard          │  │ • author           │  │ • status: CopyStatus         │  │
│  │ • seq            │  │ • category         │  │ • borrower_name              │  │
│  │ "1-3-010"        │  │ • copies: [CopyId] │  │ • loaned_at / due_at         │  │
│  └──────────────────┘  └────────────────────┘  └──────────────────────────────┘  │
└───────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── STORAGE LAYER ────────────────────────────────┐
│                                                                                   │
│  ShardAllocator<K, V> ──cursor──> highest shard with room                         │
│        │                                                                          │
│        └──loads/saves──> ShardFile<K, V> ──atomic write──> book-{N}.json          │
│                                                          book-b-{N}.json          │
│  ShardLocks ──one mutex per shard path──> serialized read-modify-write            │
└───────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── INDEX LAYER ─────────────────────────────────┐
│                                                                                   │
│  IndexBuilder ──rayon──> IndexSet { name, author, category, status, boundary }    │
│  BoundaryIndex: book-b-{N}.json -> [first mother, last mother]                    │
│  IndexQuery: (name ∪ author) ∩ category ∩ status                                 │
└───────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── PARALLEL LAYER ───────────────────────────────┐
│                                                                                   │
│  BulkLoader                                                                       │
│    phase 1: worker threads generate contiguous ordinal ranges                     │
│    phase 2: workers merge mothers under the global write lock                     │
│    phase 3: sort all copies, fill copy shards sequentially                        │
└───────────────────────────────────────────────────────────────────────────────────┘
*/
