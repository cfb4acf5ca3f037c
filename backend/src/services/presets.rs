//! Closed catalogue of export presets and the PMX package contents.

use crate::models::export::Preset;

/// The only preset with a package builder.
pub const PMX_PRESET_ID: &str = "atlas_pmx_onprem_v1";

pub const DEFAULT_DEPLOY_PROFILE: &str = "onprem_dockercompose";

pub const UNSUPPORTED_PRESET_MESSAGE: &str =
    "v4 supports preset atlas_pmx_onprem_v1 only (others reserved for v5 templates).";

pub static PRESETS: [Preset; 5] = [
    Preset {
        preset_id: PMX_PRESET_ID,
        name: "Atlas PMX — Project Management eXported Platform",
        domain: "project_management",
        deploy_profile: DEFAULT_DEPLOY_PROFILE,
        available: true,
    },
    Preset {
        preset_id: "atlas_dms_onprem_v1",
        name: "Atlas DMS — Document Control eXported Platform",
        domain: "document_control",
        deploy_profile: DEFAULT_DEPLOY_PROFILE,
        available: false,
    },
    Preset {
        preset_id: "atlas_qaqc_onprem_v1",
        name: "Atlas QCX — QA/QC eXported Platform",
        domain: "qa_qc",
        deploy_profile: DEFAULT_DEPLOY_PROFILE,
        available: false,
    },
    Preset {
        preset_id: "atlas_hse_onprem_v1",
        name: "Atlas HSEX — HSE eXported Platform",
        domain: "hse",
        deploy_profile: DEFAULT_DEPLOY_PROFILE,
        available: false,
    },
    Preset {
        preset_id: "atlas_media_onprem_v1",
        name: "Atlas MEX — Media Analyzer eXported Platform",
        domain: "media_analysis",
        deploy_profile: DEFAULT_DEPLOY_PROFILE,
        available: false,
    },
];

pub fn list_presets() -> &'static [Preset] {
    &PRESETS
}

pub fn find_preset(preset_id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.preset_id == preset_id)
}

const PMX_MAIN_PY: &str = r#"from fastapi import FastAPI, UploadFile, File
from pydantic import BaseModel
from typing import Optional
import os, sqlite3, uuid, time

APP_NAME = os.getenv('ATLAS_PRODUCT_NAME', 'Atlas PMX')
DB_PATH = os.getenv('ATLAS_DB_PATH', '/data/app.db')
UPLOAD_DIR = os.getenv('ATLAS_UPLOAD_DIR', '/data/uploads')
os.makedirs(os.path.dirname(DB_PATH), exist_ok=True)
os.makedirs(UPLOAD_DIR, exist_ok=True)


def db():
    con = sqlite3.connect(DB_PATH)
    con.row_factory = sqlite3.Row
    return con


def init_db():
    con = db()
    cur = con.cursor()
    cur.execute('CREATE TABLE IF NOT EXISTS projects(id TEXT PRIMARY KEY,name TEXT,description TEXT,created_at INTEGER)')
    cur.execute('CREATE TABLE IF NOT EXISTS tasks(id TEXT PRIMARY KEY,project_id TEXT,title TEXT,status TEXT,due_date TEXT,created_at INTEGER)')
    cur.execute('CREATE TABLE IF NOT EXISTS files(id TEXT PRIMARY KEY,project_id TEXT,filename TEXT,mime TEXT,size INTEGER,created_at INTEGER)')
    con.commit()
    con.close()


init_db()
app = FastAPI(title=APP_NAME, version='1.0.0')


@app.get('/healthz')
def healthz():
    return {'ok': True, 'product': APP_NAME}


class ProjectIn(BaseModel):
    name: str
    description: Optional[str] = ''


@app.get('/api/projects')
def list_projects():
    con = db()
    rows = con.execute('SELECT * FROM projects ORDER BY created_at DESC').fetchall()
    con.close()
    return {'items': [dict(r) for r in rows]}


@app.post('/api/projects')
def create_project(p: ProjectIn):
    pid = str(uuid.uuid4())
    con = db()
    con.execute('INSERT INTO projects VALUES(?,?,?,?)', (pid, p.name, p.description or '', int(time.time())))
    con.commit()
    con.close()
    return {'id': pid}


@app.post('/api/files/upload')
async def upload(project_id: str, file: UploadFile = File(...)):
    data = await file.read()
    fid = str(uuid.uuid4())
    with open(os.path.join(UPLOAD_DIR, f'{fid}_{file.filename}'), 'wb') as f:
        f.write(data)
    con = db()
    con.execute('INSERT INTO files VALUES(?,?,?,?,?,?)', (fid, project_id, file.filename, file.content_type or '', len(data), int(time.time())))
    con.commit()
    con.close()
    return {'id': fid, 'filename': file.filename}
"#;

const PMX_COMPOSE: &str = "services:
  api:
    build: { context: ./backend, dockerfile: Dockerfile }
    environment:
      - ATLAS_PRODUCT_NAME=Atlas PMX
      - ATLAS_DB_PATH=/data/app.db
      - ATLAS_UPLOAD_DIR=/data/uploads
    volumes: [ 'atlas_pmx_data:/data' ]
    ports: [ '8000:8000' ]
  web:
    build: { context: ./frontend, dockerfile: Dockerfile }
    ports: [ '5173:80' ]
volumes: { atlas_pmx_data: {} }
";

/// Files of the PMX package, relative to the package root.
pub const PMX_PACKAGE_FILES: &[(&str, &str)] = &[
    ("backend/app/__init__.py", ""),
    ("backend/app/main.py", PMX_MAIN_PY),
    (
        "backend/requirements.txt",
        "fastapi==0.115.0\nuvicorn==0.30.6\npython-multipart==0.0.9\npydantic==2.8.2\n",
    ),
    (
        "backend/Dockerfile",
        "FROM python:3.11-slim\nWORKDIR /app\nCOPY requirements.txt /app/requirements.txt\n\
         RUN pip install --no-cache-dir -r requirements.txt\nCOPY app /app/app\nEXPOSE 8000\n\
         CMD [\"uvicorn\", \"app.main:app\", \"--host\", \"0.0.0.0\", \"--port\", \"8000\"]\n",
    ),
    ("frontend/README.md", "Atlas PMX UI (Windows-style) - scaffold.\n"),
    (
        "frontend/Dockerfile",
        "FROM nginx:alpine\nCOPY . /usr/share/nginx/html\nEXPOSE 80\n",
    ),
    ("ops/docker-compose.yml", PMX_COMPOSE),
    (".env.example", "JWT_SECRET=change_me_strong\n"),
    (
        "README_DEPLOY.md",
        "Run: docker compose -f ops/docker-compose.yml up -d --build\n",
    ),
    ("plugins/README.md", "Drop plugins here.\n"),
];
